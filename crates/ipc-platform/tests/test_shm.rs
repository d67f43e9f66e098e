// SPDX-License-Identifier: MIT

use ipc_platform::ShmRegion;

#[test]
fn create_then_join_share_memory() {
    let name = format!("ipcplat_test_shm_{}", std::process::id());
    let creator = ShmRegion::create(&name, 4096).unwrap();
    unsafe {
        std::ptr::write(creator.as_mut_ptr() as *mut u32, 0xDEAD_BEEF);
    }

    let joiner = ShmRegion::join(&name, 4096).unwrap();
    let value = unsafe { std::ptr::read(joiner.as_mut_ptr() as *const u32) };
    assert_eq!(value, 0xDEAD_BEEF);
}

#[test]
fn create_twice_with_same_name_fails() {
    let name = format!("ipcplat_test_shm_dup_{}", std::process::id());
    let _first = ShmRegion::create(&name, 64).unwrap();
    let second = ShmRegion::create(&name, 64);
    assert!(second.is_err());
}
