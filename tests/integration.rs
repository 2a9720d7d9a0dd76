//! End-to-end scenarios driven entirely through the [`vfs::Vfs`] facade,
//! exercising mount precedence, observation, and the operation engine
//! together the way a caller actually would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use vfs::{
    BlockPool, CaseSensitivity, Dispatcher, Event, GlobFilter, LiveAssignment, Notification, OpenMode, OperationSession,
    OptionBag, OptionKind, OptionValue, Policy, VPath, Vfs, VfsError,
};
use vfs_test_support::MemoryBackend;

fn mount_memory(vfs: &Vfs, path: &str, backend: MemoryBackend) {
    vfs.mount(
        &VPath::from(path),
        vec![LiveAssignment::new("mem", Arc::new(backend), OptionBag::new())],
    )
    .unwrap();
}

#[test]
fn empty_vfs_get_entry_and_browse_report_an_empty_root() {
    let vfs = Vfs::new("empty", CaseSensitivity::Sensitive);

    let root = vfs.get_entry(&VPath::root(), &OptionBag::new()).unwrap();
    assert!(root.is_directory());

    let children = vfs.browse(&VPath::root(), &OptionBag::new()).unwrap();
    assert!(children.is_empty());

    let err = vfs.browse(&VPath::from("anything"), &OptionBag::new()).unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)));
}

#[test]
fn layered_mounts_merge_by_name_with_the_higher_precedence_mount_winning() {
    let vfs = Vfs::new("layered", CaseSensitivity::Sensitive);

    let ram = MemoryBackend::new();
    mount_memory(&vfs, "", ram);

    let tmp_primary = MemoryBackend::new();
    tmp_primary.seed_file("a", b"from tmp mount".to_vec());
    mount_memory(&vfs, "tmp", tmp_primary);

    let first = vfs.browse(&VPath::from("tmp"), &OptionBag::new()).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name(), Some("a"));

    // A second assignment at the same mountpoint only shows up if a
    // caller re-mounts with both assignments; `mount` replaces, it does
    // not stack. Seed `b` onto the already-mounted backend's tree by
    // mounting a fresh dispatch set with both backends present.
    let ram_with_b = MemoryBackend::new();
    ram_with_b.seed_file("a", b"shadowed".to_vec());
    ram_with_b.seed_file("b", b"from ram".to_vec());
    let tmp_primary_again = MemoryBackend::new();
    tmp_primary_again.seed_file("a", b"from tmp mount".to_vec());
    vfs.mount(
        &VPath::from("tmp"),
        vec![
            LiveAssignment::new("tmp-primary", Arc::new(tmp_primary_again), OptionBag::new()),
            LiveAssignment::new("ram-fallback", Arc::new(ram_with_b), OptionBag::new()),
        ],
    )
    .unwrap();

    let merged = vfs.browse(&VPath::from("tmp"), &OptionBag::new()).unwrap();
    let mut names: Vec<&str> = merged.iter().filter_map(|e| e.name()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a", "b"]);

    let mut file = vfs.open(&VPath::from("tmp/a"), OpenMode::read(), &OptionBag::new()).unwrap();
    let mut contents = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut contents).unwrap();
    assert_eq!(contents, b"from tmp mount");
}

struct Collector(Mutex<Vec<Notification>>);

impl Collector {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }
}

struct CollectingDispatcher(Arc<Collector>);

impl Dispatcher for CollectingDispatcher {
    fn dispatch(&self, notification: Notification) {
        self.0 .0.lock().unwrap().push(notification);
    }
}

#[test]
fn subscription_delivers_start_then_change_events_from_the_mounted_backend() {
    let vfs = Vfs::new("observed", CaseSensitivity::Sensitive);
    let backend = MemoryBackend::new();
    backend.seed_file("dir/file.txt", b"hi".to_vec());
    mount_memory(&vfs, "", backend);

    let collector = Collector::new();
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(CollectingDispatcher(Arc::clone(&collector)));
    let filter = GlobFilter::compile("dir/*.txt").unwrap();
    let subscription = vfs.observe(filter, dispatcher, &OptionBag::new()).unwrap();

    {
        let events = collector.0.lock().unwrap();
        assert!(matches!(
            events.first(),
            Some(Notification::Event(env)) if matches!(env.event, Event::Start)
        ));
    }

    subscription.dispose();

    let mut saw_completed = false;
    for _ in 0..50 {
        if collector.0.lock().unwrap().iter().any(|n| matches!(n, Notification::Completed)) {
            saw_completed = true;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(saw_completed, "expected exactly one Completed notification after dispose");
}

fn copy_session(block_size: usize, capacity: usize) -> OperationSession {
    OperationSession::new(Policy::session_default(), BlockPool::new(block_size, capacity), 0)
}

#[test]
fn copy_tree_estimate_then_run_recreates_structure_and_rolls_back_cleanly() {
    let vfs = Vfs::new("copytree", CaseSensitivity::Sensitive);
    let backend = MemoryBackend::new();
    backend.seed_file("a/b/c.txt", b"hi".to_vec());
    mount_memory(&vfs, "", backend);

    let session = copy_session(1024, 4);
    let mut op = vfs.copy_tree(VPath::from("a"), VPath::from("dst/a"), OptionBag::new());
    vfs.estimate(&mut op, &session).unwrap();
    vfs.run(&mut op, &session).unwrap();

    let mut file = vfs
        .open(&VPath::from("dst/a/b/c.txt"), OpenMode::read(), &OptionBag::new())
        .unwrap();
    let mut contents = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut contents).unwrap();
    assert_eq!(contents, b"hi");

    let mut rollback = op.rollback().expect("a completed copy-tree is reversible");
    vfs.run(&mut *rollback, &session).unwrap();
    assert!(vfs.get_entry(&VPath::from("dst/a"), &OptionBag::new()).is_err());
}

#[test]
fn copy_file_runs_out_of_quota_mid_stream_and_automatically_removes_the_partial_destination() {
    let vfs = Vfs::new("quota", CaseSensitivity::Sensitive);
    let backend = MemoryBackend::new();
    backend.seed_file("src.bin", vec![9u8; 3072]);
    mount_memory(&vfs, "", backend);

    // A zero-buffer pool forces the very first allocate to fail, so the
    // outcome is deterministic instead of racing the reader thread against
    // the writer's release-after-write.
    let session = copy_session(1024, 0);
    let mut op = vfs.copy_file(VPath::from("src.bin"), VPath::from("dst.bin"), OptionBag::new());
    let result = vfs.run(&mut op, &session);

    assert!(matches!(result, Err(VfsError::OutOfDiskSpace)));
    assert!(vfs.get_entry(&VPath::from("dst.bin"), &OptionBag::new()).is_err());
}

#[test]
fn sub_path_option_shifts_the_backends_effective_root() {
    let vfs = Vfs::new("subpath", CaseSensitivity::Sensitive);
    let backend = MemoryBackend::new();
    backend.seed_file("opt/app/config.ini", b"[core]".to_vec());

    vfs.mount(
        &VPath::from("app"),
        vec![LiveAssignment::new(
            "host",
            Arc::new(backend),
            OptionBag::new().with(OptionKind::SubPath, OptionValue::SubPath("opt/app".to_owned())),
        )],
    )
    .unwrap();

    let mut file = vfs
        .open(&VPath::from("app/config.ini"), OpenMode::read(), &OptionBag::new())
        .unwrap();
    let mut contents = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut contents).unwrap();
    assert_eq!(contents, b"[core]");
}

#[test]
fn belate_dispose_keeps_a_handed_off_resource_alive_until_the_worker_releases_it() {
    let vfs = Vfs::new("belate", CaseSensitivity::Sensitive);
    let released = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&released);
    vfs.add_dispose_action(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    });

    let handle = vfs.belate_dispose();
    vfs.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 0, "belated handle must postpone release");

    handle.release();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
