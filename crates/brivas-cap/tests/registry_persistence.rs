//! SCCP resource registry persistence

use brivas_cap::sccp::{
    ConcernedSignalingPointCode, RemoteSignalingPointCode, RemoteSubSystem, SccpResource,
};
use brivas_cap::RegistryError;

fn populate(resource: &SccpResource) {
    resource.remove_all().unwrap();
    resource
        .add_remote_spc(1, RemoteSignalingPointCode::new(6034, 0, 0))
        .unwrap();
    resource
        .add_remote_spc(2, RemoteSignalingPointCode::new(6045, 0, 0))
        .unwrap();
    resource
        .add_remote_ssn(1, RemoteSubSystem::new(6034, 8, 0, false))
        .unwrap();
    resource
        .add_remote_ssn(2, RemoteSubSystem::new(6045, 8, 0, false))
        .unwrap();
    resource
        .add_concerned_spc(1, ConcernedSignalingPointCode::new(603))
        .unwrap();
    resource
        .add_concerned_spc(2, ConcernedSignalingPointCode::new(604))
        .unwrap();
}

#[test]
fn test_resources_reload_in_new_instance() {
    let dir = tempfile::tempdir().unwrap();

    let resource = SccpResource::new("SccpResourceTest", dir.path());
    resource.start().unwrap();
    populate(&resource);

    // second instance with the same name sees every mutation without a stop
    let reloaded = SccpResource::new("SccpResourceTest", dir.path());
    reloaded.start().unwrap();

    assert_eq!(reloaded.remote_spcs().unwrap().len(), 2);
    assert_eq!(reloaded.remote_ssns().unwrap().len(), 2);
    assert_eq!(reloaded.concerned_spcs().unwrap().len(), 2);

    assert_eq!(reloaded.get_remote_spc(1).unwrap().remote_spc, 6034);
    assert_eq!(reloaded.get_remote_ssn(1).unwrap().remote_ssn, 8);
    assert_eq!(reloaded.get_concerned_spc(1).unwrap().remote_spc, 603);
    assert_eq!(
        reloaded.get_remote_spc(2).unwrap(),
        RemoteSignalingPointCode::new(6045, 0, 0)
    );
}

#[test]
fn test_remove_all_persists_empty_state() {
    let dir = tempfile::tempdir().unwrap();

    let resource = SccpResource::new("clear", dir.path());
    resource.start().unwrap();
    populate(&resource);
    resource.remove_all().unwrap();

    for id in [1, 2] {
        assert!(matches!(
            resource.get_remote_spc(id),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            resource.get_remote_ssn(id),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            resource.get_concerned_spc(id),
            Err(RegistryError::NotFound { .. })
        ));
    }

    let reloaded = SccpResource::new("clear", dir.path());
    reloaded.start().unwrap();
    assert!(reloaded.is_empty().unwrap());
}

#[test]
fn test_stop_persists_and_blocks_lookups() {
    let dir = tempfile::tempdir().unwrap();

    let resource = SccpResource::new("lifecycle", dir.path());
    resource.start().unwrap();
    resource
        .add_remote_spc(7, RemoteSignalingPointCode::new(1234, 0, 0))
        .unwrap();
    resource.stop().unwrap();

    assert!(resource.persist_file().unwrap().exists());
    assert!(matches!(
        resource.get_remote_spc(7),
        Err(RegistryError::NotStarted(_))
    ));
    assert!(matches!(
        resource.add_remote_spc(8, RemoteSignalingPointCode::new(1, 0, 0)),
        Err(RegistryError::NotStarted(_))
    ));

    resource.start().unwrap();
    assert_eq!(resource.get_remote_spc(7).unwrap().remote_spc, 1234);
}

#[test]
fn test_instances_are_isolated_by_name() {
    let dir = tempfile::tempdir().unwrap();

    let a = SccpResource::new("a", dir.path());
    a.start().unwrap();
    a.add_concerned_spc(1, ConcernedSignalingPointCode::new(603))
        .unwrap();

    let b = SccpResource::new("b", dir.path());
    b.start().unwrap();
    assert!(b.is_empty().unwrap());
    assert_ne!(a.persist_file(), b.persist_file());
}

#[test]
fn test_corrupt_state_file_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let resource = SccpResource::new("corrupt", dir.path());
    std::fs::write(resource.persist_file().unwrap(), b"{ not json").unwrap();

    assert!(matches!(
        resource.start(),
        Err(RegistryError::Persistence(_))
    ));
    assert!(!resource.is_started());
}

#[test]
fn test_failed_persist_leaves_tables_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    // parent of the state file is a regular file, so every write fails
    let resource = SccpResource::new("unwritable", blocker.join("sub"));
    resource.start().unwrap();

    assert!(resource
        .add_remote_spc(1, RemoteSignalingPointCode::new(6034, 0, 0))
        .is_err());
    assert!(matches!(
        resource.get_remote_spc(1),
        Err(RegistryError::NotFound { id: 1, .. })
    ));
    // a retry fails on persistence again, not on a phantom entry
    assert!(!matches!(
        resource.add_remote_spc(1, RemoteSignalingPointCode::new(6034, 0, 0)),
        Err(RegistryError::AlreadyExists { .. })
    ));
    assert!(resource.remove_all().is_err());
    assert!(resource.is_empty().unwrap());
}

#[test]
fn test_failed_remove_keeps_entry() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");

    let resource = SccpResource::new("sticky", &state_dir);
    resource.start().unwrap();
    resource
        .add_remote_ssn(1, RemoteSubSystem::new(6034, 8, 0, false))
        .unwrap();

    // replace the state directory with a file
    std::fs::remove_dir_all(&state_dir).unwrap();
    std::fs::write(&state_dir, b"").unwrap();

    assert!(resource.remove_remote_ssn(1).is_err());
    assert_eq!(resource.get_remote_ssn(1).unwrap().remote_ssn, 8);
    assert!(resource.remove_all().is_err());
    assert_eq!(resource.remote_ssns().unwrap().len(), 1);
}

#[test]
fn test_remove_all_is_atomic_to_readers() {
    const ENTRIES: usize = 50;

    let resource = SccpResource::in_memory("concurrent");
    resource.start().unwrap();
    for id in 1..=ENTRIES as u32 {
        resource
            .add_remote_spc(id, RemoteSignalingPointCode::new(6000 + id, 0, 0))
            .unwrap();
        resource
            .add_remote_ssn(id, RemoteSubSystem::new(6000 + id, 8, 0, false))
            .unwrap();
        resource
            .add_concerned_spc(id, ConcernedSignalingPointCode::new(600 + id))
            .unwrap();
    }

    std::thread::scope(|s| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let mut cleared = false;
                    while !cleared {
                        let sizes = [
                            resource.remote_spcs().unwrap().len(),
                            resource.remote_ssns().unwrap().len(),
                            resource.concerned_spcs().unwrap().len(),
                        ];
                        for size in sizes {
                            assert!(
                                size == 0 || size == ENTRIES,
                                "partial collection of {} entries",
                                size
                            );
                        }
                        match resource.get_remote_ssn(ENTRIES as u32) {
                            Ok(ssn) => assert_eq!(ssn.remote_spc, 6000 + ENTRIES as u32),
                            Err(e) => assert!(matches!(e, RegistryError::NotFound { .. })),
                        }
                        cleared = sizes.iter().all(|&n| n == 0);
                    }
                    // nothing comes back once cleared
                    assert!(resource.is_empty().unwrap());
                })
            })
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(5));
        resource.remove_all().unwrap();

        for reader in readers {
            reader.join().unwrap();
        }
    });

    for id in 1..=ENTRIES as u32 {
        assert!(resource.get_remote_spc(id).is_err());
        assert!(resource.get_remote_ssn(id).is_err());
        assert!(resource.get_concerned_spc(id).is_err());
    }
}
