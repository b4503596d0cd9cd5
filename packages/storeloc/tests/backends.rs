use storeloc::local::{LocalAdapter, LocalBackend, LocalOptions};
use storeloc::{Backend, Binding, Location, MkdirOptions};
use tempfile::TempDir;

#[test]
fn test_local_backend_through_umbrella() {
    let dir = TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path().to_str().unwrap(), LocalOptions::default()).unwrap();
    assert!(backend.startup().unwrap().online);

    let binding = Binding::blocking_native(LocalAdapter::new(backend));
    let notes = Location::new(&binding, ["notes", "today.txt"]).unwrap();
    notes
        .parent()
        .mkdir(MkdirOptions::new().parents(true).exist_ok(true))
        .unwrap();
    notes.write_text("hello").unwrap();

    let found: Vec<String> = Location::root(&binding)
        .rglob("*.txt")
        .unwrap()
        .map(|l| l.unwrap().as_posix())
        .collect();
    assert_eq!(found, vec!["notes/today.txt"]);
}

#[test]
fn test_rclone_backend_without_executable_is_unavailable() {
    let options = storeloc::rclone::RcloneOptions {
        rclone_exe: "no-such-rclone-binary".into(),
        ..Default::default()
    };
    let backend = storeloc::rclone::RcloneBackend::new("books:", options).unwrap();
    assert!(backend.is_read_only());
    assert!(matches!(
        backend.startup(),
        Err(storeloc::Error::BackendUnavailable { .. })
    ));
}
