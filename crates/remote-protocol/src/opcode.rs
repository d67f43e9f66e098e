// SPDX-License-Identifier: MIT
//
// The fixed set of remote-call opcodes (§4.3), ported from the original
// C remoting layer's `remote_function_t` enum (`remote.h`). Numeric values
// are preserved so a log or trace captured against either implementation
// reads the same opcode id.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    GetTypesPlatform = 0,
    GetVersion = 1,
    SetDebugLogging = 2,
    Instantiate = 3,
    FreeInstance = 4,
    SetupExperiment = 5,
    EnterInitializationMode = 6,
    ExitInitializationMode = 7,
    Terminate = 8,
    Reset = 9,
    GetReal = 10,
    GetInteger = 11,
    GetBoolean = 12,
    GetString = 13,
    SetReal = 14,
    SetInteger = 15,
    SetBoolean = 16,
    SetString = 17,
    GetFMUstate = 18,
    SetFMUstate = 19,
    FreeFMUstate = 20,
    SerializedFMUstateSize = 21,
    SerializeFMUstate = 22,
    DeSerializeFMUstate = 23,
    GetDirectionalDerivative = 24,

    EnterEventMode = 25,
    NewDiscreteStates = 26,
    EnterContinuousTimeMode = 27,
    CompletedIntegratorStep = 28,
    SetTime = 29,
    SetContinuousStates = 30,
    GetDerivatives = 31,
    GetEventIndicators = 32,
    GetContinuousStates = 33,
    GetNominalsOfContinuousStates = 34,

    SetRealInputDerivatives = 35,
    GetRealOutputDerivatives = 36,
    DoStep = 37,
    CancelStep = 38,
    GetStatus = 39,
    GetRealStatus = 40,
    GetIntegerStatus = 41,
    GetBooleanStatus = 42,
    GetStringStatus = 43,
}

impl Opcode {
    /// Opcodes that never cross the wire in this implementation: they are
    /// served locally by the client shim from its own cached tables or
    /// literal constants (§4.3 "served locally by the client", §6
    /// "GetTypesPlatform/GetVersion return literal strings without an RPC").
    pub const fn is_local_only(self) -> bool {
        matches!(self, Opcode::GetTypesPlatform | Opcode::GetVersion)
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        use Opcode::*;
        let all = [
            GetTypesPlatform,
            GetVersion,
            SetDebugLogging,
            Instantiate,
            FreeInstance,
            SetupExperiment,
            EnterInitializationMode,
            ExitInitializationMode,
            Terminate,
            Reset,
            GetReal,
            GetInteger,
            GetBoolean,
            GetString,
            SetReal,
            SetInteger,
            SetBoolean,
            SetString,
            GetFMUstate,
            SetFMUstate,
            FreeFMUstate,
            SerializedFMUstateSize,
            SerializeFMUstate,
            DeSerializeFMUstate,
            GetDirectionalDerivative,
            EnterEventMode,
            NewDiscreteStates,
            EnterContinuousTimeMode,
            CompletedIntegratorStep,
            SetTime,
            SetContinuousStates,
            GetDerivatives,
            GetEventIndicators,
            GetContinuousStates,
            GetNominalsOfContinuousStates,
            SetRealInputDerivatives,
            GetRealOutputDerivatives,
            DoStep,
            CancelStep,
            GetStatus,
            GetRealStatus,
            GetIntegerStatus,
            GetBooleanStatus,
            GetStringStatus,
        ];
        all.into_iter().find(|op| *op as u32 == v)
    }

    /// True for the state-serialization family, which this bridge reports
    /// as `NotImplemented` (§7) rather than forwarding to the model.
    pub const fn is_state_serialization(self) -> bool {
        matches!(
            self,
            Opcode::GetFMUstate
                | Opcode::SetFMUstate
                | Opcode::FreeFMUstate
                | Opcode::SerializedFMUstateSize
                | Opcode::SerializeFMUstate
                | Opcode::DeSerializeFMUstate
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::GetTypesPlatform => "GetTypesPlatform",
            Opcode::GetVersion => "GetVersion",
            Opcode::SetDebugLogging => "SetDebugLogging",
            Opcode::Instantiate => "Instantiate",
            Opcode::FreeInstance => "FreeInstance",
            Opcode::SetupExperiment => "SetupExperiment",
            Opcode::EnterInitializationMode => "EnterInitializationMode",
            Opcode::ExitInitializationMode => "ExitInitializationMode",
            Opcode::Terminate => "Terminate",
            Opcode::Reset => "Reset",
            Opcode::GetReal => "GetReal",
            Opcode::GetInteger => "GetInteger",
            Opcode::GetBoolean => "GetBoolean",
            Opcode::GetString => "GetString",
            Opcode::SetReal => "SetReal",
            Opcode::SetInteger => "SetInteger",
            Opcode::SetBoolean => "SetBoolean",
            Opcode::SetString => "SetString",
            Opcode::GetFMUstate => "GetFMUstate",
            Opcode::SetFMUstate => "SetFMUstate",
            Opcode::FreeFMUstate => "FreeFMUstate",
            Opcode::SerializedFMUstateSize => "SerializedFMUstateSize",
            Opcode::SerializeFMUstate => "SerializeFMUstate",
            Opcode::DeSerializeFMUstate => "DeSerializeFMUstate",
            Opcode::GetDirectionalDerivative => "GetDirectionalDerivative",
            Opcode::EnterEventMode => "EnterEventMode",
            Opcode::NewDiscreteStates => "NewDiscreteStates",
            Opcode::EnterContinuousTimeMode => "EnterContinuousTimeMode",
            Opcode::CompletedIntegratorStep => "CompletedIntegratorStep",
            Opcode::SetTime => "SetTime",
            Opcode::SetContinuousStates => "SetContinuousStates",
            Opcode::GetDerivatives => "GetDerivatives",
            Opcode::GetEventIndicators => "GetEventIndicators",
            Opcode::GetContinuousStates => "GetContinuousStates",
            Opcode::GetNominalsOfContinuousStates => "GetNominalsOfContinuousStates",
            Opcode::SetRealInputDerivatives => "SetRealInputDerivatives",
            Opcode::GetRealOutputDerivatives => "GetRealOutputDerivatives",
            Opcode::DoStep => "DoStep",
            Opcode::CancelStep => "CancelStep",
            Opcode::GetStatus => "GetStatus",
            Opcode::GetRealStatus => "GetRealStatus",
            Opcode::GetIntegerStatus => "GetIntegerStatus",
            Opcode::GetBooleanStatus => "GetBooleanStatus",
            Opcode::GetStringStatus => "GetStringStatus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_match_published_table() {
        assert_eq!(Opcode::Instantiate as u32, 3);
        assert_eq!(Opcode::DoStep as u32, 37);
        assert_eq!(Opcode::GetStringStatus as u32, 43);
    }

    #[test]
    fn from_u32_roundtrips() {
        for op in [Opcode::Instantiate, Opcode::DoStep, Opcode::GetDerivatives] {
            assert_eq!(Opcode::from_u32(op as u32), Some(op));
        }
        assert_eq!(Opcode::from_u32(9999), None);
    }

    #[test]
    fn state_serialization_family_is_flagged() {
        assert!(Opcode::GetFMUstate.is_state_serialization());
        assert!(!Opcode::DoStep.is_state_serialization());
    }
}
