// SPDX-License-Identifier: MIT
//
// Side-channel descriptor file (§6): `<resourceLocation>/remoting_table.txt`,
// plain whitespace-separated ASCII decimal. Used in typed mode to pre-size
// the variable arrays and pre-sort the value-reference tables.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("descriptor file is missing the counts line")]
    MissingCounts,
    #[error("malformed counts line: {0}")]
    BadCounts(String),
    #[error("expected {expected} value references for {kind}, found {found}")]
    CountMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("malformed value reference {0:?}")]
    BadValueReference(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotingTable {
    pub real_refs: Vec<u32>,
    pub integer_refs: Vec<u32>,
    pub boolean_refs: Vec<u32>,
}

impl RemotingTable {
    pub fn n_reals(&self) -> usize {
        self.real_refs.len()
    }

    pub fn n_integers(&self) -> usize {
        self.integer_refs.len()
    }

    pub fn n_booleans(&self) -> usize {
        self.boolean_refs.len()
    }

    /// Parse the `remoting_table.txt` format:
    /// ```text
    /// <nReals> <nIntegers> <nBooleans>
    /// <real_vr_0> <real_vr_1> ... <real_vr_nReals-1>
    /// <int_vr_0> ...
    /// <bool_vr_0> ...
    /// ```
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut tokens = text.split_ascii_whitespace();

        let n_reals: usize = tokens
            .next()
            .ok_or(DescriptorError::MissingCounts)?
            .parse()
            .map_err(|_| DescriptorError::BadCounts(text.to_string()))?;
        let n_integers: usize = tokens
            .next()
            .ok_or(DescriptorError::MissingCounts)?
            .parse()
            .map_err(|_| DescriptorError::BadCounts(text.to_string()))?;
        let n_booleans: usize = tokens
            .next()
            .ok_or(DescriptorError::MissingCounts)?
            .parse()
            .map_err(|_| DescriptorError::BadCounts(text.to_string()))?;

        let real_refs = Self::take_refs(&mut tokens, n_reals, "real")?;
        let integer_refs = Self::take_refs(&mut tokens, n_integers, "integer")?;
        let boolean_refs = Self::take_refs(&mut tokens, n_booleans, "boolean")?;

        Ok(Self {
            real_refs,
            integer_refs,
            boolean_refs,
        })
    }

    fn take_refs<'a>(
        tokens: &mut impl Iterator<Item = &'a str>,
        count: usize,
        kind: &'static str,
    ) -> Result<Vec<u32>, DescriptorError> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let tok = tokens.next().ok_or(DescriptorError::CountMismatch {
                kind,
                expected: count,
                found: out.len(),
            })?;
            let vr: u32 = tok
                .parse()
                .map_err(|_| DescriptorError::BadValueReference(tok.to_string()))?;
            out.push(vr);
        }
        Ok(out)
    }

    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn descriptor_path(resource_location: &Path) -> std::path::PathBuf {
        resource_location.join("remoting_table.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_table() {
        let text = "2 1 0\n10 11\n20\n";
        let table = RemotingTable::parse(text).unwrap();
        assert_eq!(table.real_refs, vec![10, 11]);
        assert_eq!(table.integer_refs, vec![20]);
        assert!(table.boolean_refs.is_empty());
    }

    #[test]
    fn tolerates_arbitrary_whitespace() {
        let text = "  1   1   1  \n 5 \n 6 \n 7 \n";
        let table = RemotingTable::parse(text).unwrap();
        assert_eq!(table.real_refs, vec![5]);
        assert_eq!(table.integer_refs, vec![6]);
        assert_eq!(table.boolean_refs, vec![7]);
    }

    #[test]
    fn rejects_truncated_table() {
        let text = "2 0 0\n10\n"; // missing second real vr
        assert!(matches!(
            RemotingTable::parse(text),
            Err(DescriptorError::CountMismatch { kind: "real", .. })
        ));
    }

    #[test]
    fn rejects_missing_counts_line() {
        assert!(matches!(
            RemotingTable::parse(""),
            Err(DescriptorError::MissingCounts)
        ));
    }

    #[test]
    fn rejects_non_numeric_value_reference() {
        let text = "1 0 0\nabc\n";
        assert!(matches!(
            RemotingTable::parse(text),
            Err(DescriptorError::BadValueReference(_))
        ));
    }
}
