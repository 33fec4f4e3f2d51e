//! Boot sequence against the recording mount backend and init launcher.
//!
//! The system root is a temporary directory standing in for `/`; its mount
//! table is modelled in memory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use hostroot_common::config::RootSwitchConfig;
use hostroot_common::error::HostrootError;
use hostroot_common::types::SwitchState;
use hostroot_core::filesystem::mount::Access;
use hostroot_core::filesystem::mountinfo::MountEntry;
use hostroot_core::testing::{Call, RecordingBackend, RecordingLauncher};
use hostroot_image::storage::DiskStoreOpener;
use hostroot_image::testing::StoreFixture;
use hostroot_runtime::engine::Engine;

type TestEngine = Engine<RecordingBackend, RecordingLauncher, DiskStoreOpener>;

fn boot_mounts(root: &Path) -> Vec<MountEntry> {
    vec![
        MountEntry::new("/dev/mmcblk0p2", root, "ext4"),
        MountEntry::new("devtmpfs", root.join("dev"), "devtmpfs"),
        MountEntry::new("devpts", root.join("dev/pts"), "devpts"),
        MountEntry::new("proc", root.join("proc"), "proc"),
        MountEntry::new("tmpfs", root.join("run"), "tmpfs"),
    ]
}

fn config(root: &Path) -> RootSwitchConfig {
    RootSwitchConfig {
        host_root: root.to_path_buf(),
        shm_dir: root.join("dev/shm"),
        ..RootSwitchConfig::default()
    }
}

fn engine(root: &Path, backend: RecordingBackend, launcher: RecordingLauncher) -> TestEngine {
    Engine::with_parts(backend, launcher, DiskStoreOpener, config(root))
}

fn argv() -> Vec<OsString> {
    vec![OsString::from("/sbin/init"), OsString::from("quiet")]
}

fn env() -> Vec<(OsString, OsString)> {
    vec![(OsString::from("TERM"), OsString::from("linux"))]
}

fn position(calls: &[Call], predicate: impl Fn(&Call) -> bool) -> usize {
    calls
        .iter()
        .position(predicate)
        .expect("call should have been made")
}

#[test]
fn boot_pivots_into_active_container_and_execs_init() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture
        .set_current("overlay2", "deadbeef01")
        .expect("current");
    let layer = fixture
        .add_overlay2_container("deadbeef01", "5e1f", &["l/AAA", "l/BBB"])
        .expect("layer");
    let merged = layer.join("merged");
    let engine = engine(
        root,
        RecordingBackend::with_mounts(boot_mounts(root)),
        RecordingLauncher::new(),
    );

    engine.boot(&argv(), &env()).expect("boot");

    let calls = engine.backend().calls();
    let remount_root = position(&calls, |c| {
        matches!(c, Call::Remount { target, access: Access::ReadWrite, .. } if target == root)
    });
    let shm = position(&calls, |c| matches!(c, Call::Mount { fstype, .. } if fstype == "tmpfs"));
    let overlay = position(&calls, |c| {
        matches!(c, Call::Mount { fstype, .. } if fstype == "overlay")
    });
    let layer_rw = position(&calls, |c| {
        matches!(c, Call::Remount { target, access: Access::ReadWrite, .. } if *target == merged)
    });
    let first_move = position(&calls, |c| matches!(c, Call::Move { .. }));
    let pivot = position(&calls, |c| matches!(c, Call::PivotRoot { .. }));
    assert!(remount_root < shm);
    assert!(shm < overlay);
    assert!(overlay < layer_rw);
    assert!(layer_rw < first_move);
    assert!(first_move < pivot);

    let put_old = merged.join("mnt/sysroot/active");
    assert!(put_old.is_dir());
    assert_eq!(
        calls[pivot..],
        [
            Call::PivotRoot {
                new_root: merged.clone(),
                put_old,
            },
            Call::Chdir { path: "/".into() },
        ]
    );

    let mounts = engine.backend().mountpoints();
    for sub in ["dev", "dev/pts", "proc", "run"] {
        assert!(mounts.contains(&merged.join(sub)), "{sub} not moved");
    }
    assert!(!mounts.contains(&root.join("dev/shm")));

    let execs = engine.launcher().calls();
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0].program, PathBuf::from("/sbin/init"));
    assert_eq!(execs[0].argv, argv());
    assert_eq!(execs[0].env_len, 1);
}

#[test]
fn new_root_goes_read_only_and_shm_detaches_before_moves() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture.set_current("aufs", "c1").expect("current");
    let _ = fixture
        .add_aufs_container("c1", "rw1", &["base1"])
        .expect("layer");
    let mnt = fixture.store_root().join("aufs/mnt/rw1");
    let engine = engine(
        root,
        RecordingBackend::with_mounts(boot_mounts(root)),
        RecordingLauncher::new(),
    );

    engine.boot(&argv(), &env()).expect("boot");

    let calls = engine.backend().calls();
    let read_only = position(&calls, |c| {
        matches!(c, Call::Remount { target, access: Access::ReadOnly, .. } if *target == mnt)
    });
    let detach = position(&calls, |c| {
        matches!(c, Call::Unmount { target } if *target == root.join("dev/shm"))
    });
    let first_move = position(&calls, |c| matches!(c, Call::Move { .. }));
    assert!(read_only < detach);
    assert!(detach < first_move);

    let xino = format!("xino={}", root.join("dev/shm/aufs.xino").display());
    assert!(calls.iter().any(|c| matches!(
        c,
        Call::Mount { fstype, data: Some(data), .. } if fstype == "aufs" && data.ends_with(&xino)
    )));
}

#[test]
fn failed_move_does_not_stop_later_moves() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture.set_current("overlay2", "c1").expect("current");
    let layer = fixture
        .add_overlay2_container("c1", "m1", &["l/AAA"])
        .expect("layer");
    let proc_dir = root.join("proc");
    let backend = RecordingBackend::with_mounts(boot_mounts(root))
        .fail_when(move |c| matches!(c, Call::Move { source, .. } if *source == proc_dir));
    let engine = engine(root, backend, RecordingLauncher::new());

    engine.boot(&argv(), &env()).expect("boot");

    let calls = engine.backend().calls();
    assert!(calls.contains(&Call::Move {
        source: root.join("run"),
        target: layer.join("merged/run"),
    }));
    assert_eq!(engine.launcher().calls().len(), 1);
}

#[test]
fn missing_layer_halts_after_host_preparation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture.set_current("overlay2", "c-missing").expect("current");
    let _ = fixture
        .add_overlay2_container("other", "m1", &["l/AAA"])
        .expect("layer");
    let engine = engine(
        root,
        RecordingBackend::with_mounts(boot_mounts(root)),
        RecordingLauncher::new(),
    );

    let failure = engine.boot(&argv(), &env()).expect_err("should fail");

    assert_eq!(failure.state, SwitchState::RootPrepared);
    assert!(matches!(
        failure.source,
        HostrootError::LayerNotFound { ref id } if id == "c-missing"
    ));
    assert_eq!(
        engine.backend().calls(),
        vec![
            Call::Remount {
                target: root.to_path_buf(),
                access: Access::ReadWrite,
                bind: false,
            },
            Call::Mount {
                source: "shm".into(),
                target: root.join("dev/shm"),
                fstype: "tmpfs".into(),
                data: Some("mode=1777,size=64m".into()),
            },
            Call::MakePrivate {
                target: root.join("dev/shm"),
            },
        ]
    );
    assert!(engine.launcher().calls().is_empty());
}

#[test]
fn unreadable_descriptor_fails_before_any_mount() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(
        dir.path(),
        RecordingBackend::with_mounts(boot_mounts(dir.path())),
        RecordingLauncher::new(),
    );

    let failure = engine.boot(&argv(), &env()).expect_err("should fail");

    assert_eq!(failure.state, SwitchState::Unconfigured);
    assert!(matches!(failure.source, HostrootError::Configuration { .. }));
    assert!(engine.backend().calls().is_empty());
}

#[test]
fn pivot_failure_stops_in_transplanted_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture.set_current("overlay2", "c1").expect("current");
    let _ = fixture
        .add_overlay2_container("c1", "m1", &["l/AAA"])
        .expect("layer");
    let backend = RecordingBackend::with_mounts(boot_mounts(root))
        .fail_when(|c| matches!(c, Call::PivotRoot { .. }));
    let engine = engine(root, backend, RecordingLauncher::new());

    let failure = engine.boot(&argv(), &env()).expect_err("should fail");

    assert_eq!(failure.state, SwitchState::NamespaceTransplanted);
    assert!(matches!(failure.source, HostrootError::Pivot { .. }));
    assert!(
        !engine
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Chdir { .. }))
    );
    assert!(engine.launcher().calls().is_empty());
}

#[test]
fn pivot_target_creation_failure_never_pivots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture.set_current("overlay2", "c1").expect("current");
    let layer = fixture
        .add_overlay2_container("c1", "m1", &["l/AAA"])
        .expect("layer");
    std::fs::create_dir_all(layer.join("merged")).expect("mkdir");
    std::fs::write(layer.join("merged/mnt"), "not a directory").expect("write");
    let engine = engine(
        root,
        RecordingBackend::with_mounts(boot_mounts(root)),
        RecordingLauncher::new(),
    );

    let failure = engine.boot(&argv(), &env()).expect_err("should fail");

    assert_eq!(failure.state, SwitchState::RootPrepared);
    assert!(matches!(failure.source, HostrootError::Io { .. }));
    assert!(
        !engine
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::PivotRoot { .. } | Call::Move { .. }))
    );
}

#[test]
fn exec_failure_is_reported_after_pivot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let fixture = StoreFixture::new(root);
    fixture.set_current("overlay2", "c1").expect("current");
    let _ = fixture
        .add_overlay2_container("c1", "m1", &["l/AAA"])
        .expect("layer");
    let engine = engine(
        root,
        RecordingBackend::with_mounts(boot_mounts(root)),
        RecordingLauncher::failing(),
    );

    let failure = engine.boot(&argv(), &env()).expect_err("should fail");

    assert_eq!(failure.state, SwitchState::PivotedRoot);
    assert!(matches!(failure.source, HostrootError::Exec { .. }));
    assert_eq!(engine.launcher().calls().len(), 1);
}
