mod common;

use std::collections::HashSet;
use std::path::PathBuf;

use common::{setup_temp_dir, write_file};
use lanshare::send::ShareRegistry;

#[test]
fn adding_same_path_twice_keeps_one_entry() {
    let dir = setup_temp_dir();
    let file = write_file(dir.path(), "a.txt", 12);
    let mut registry = ShareRegistry::new();

    assert!(registry.add(&file));
    let before = registry.snapshot();
    assert!(!registry.add(&file));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.snapshot(), before);
}

#[test]
fn relative_and_absolute_spellings_are_the_same_share() {
    let dir = setup_temp_dir();
    let file = write_file(dir.path(), "b.txt", 1);
    let mut registry = ShareRegistry::new();
    assert!(registry.add(&file));

    let dotted = dir.path().join(".").join("b.txt");
    assert!(registry.contains(&dotted));
    assert!(!registry.add(&dotted));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.snapshot()[0].source_path, file);
}

#[test]
fn snapshot_never_holds_duplicates_across_mutations() {
    let dir = setup_temp_dir();
    let files: Vec<PathBuf> = (0..4)
        .map(|i| write_file(dir.path(), &format!("f{i}.bin"), i + 1))
        .collect();
    let mut registry = ShareRegistry::new();

    let ops: [(&str, usize); 10] = [
        ("add", 0),
        ("add", 1),
        ("add", 0),
        ("remove", 1),
        ("add", 2),
        ("add", 1),
        ("clear", 0),
        ("add", 3),
        ("add", 3),
        ("add", 2),
    ];
    for (op, i) in ops {
        match op {
            "add" => {
                registry.add(&files[i]);
            }
            "remove" => {
                registry.remove(&HashSet::from([files[i].clone()]));
            }
            _ => registry.clear(),
        }

        let snapshot = registry.snapshot();
        let unique: HashSet<_> = snapshot.iter().map(|e| e.source_path.clone()).collect();
        assert_eq!(unique.len(), snapshot.len());
        assert_eq!(snapshot.len(), registry.len());
        assert!(snapshot.iter().enumerate().all(|(i, e)| e.id == i));
    }

    let names: Vec<String> = registry.snapshot().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["f3.bin", "f2.bin"]);
}

#[test]
fn add_folder_is_sorted_and_not_recursive() {
    let dir = setup_temp_dir();
    write_file(dir.path(), "b.txt", 2);
    write_file(dir.path(), "a.txt", 1);
    let nested = dir.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    write_file(&nested, "deep.txt", 3);

    let mut registry = ShareRegistry::new();
    assert_eq!(registry.add_folder(dir.path()), 2);

    let names: Vec<String> = registry.snapshot().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    // Second pass adds nothing new
    assert_eq!(registry.add_folder(dir.path()), 0);
}

#[test]
fn add_folder_on_missing_directory_returns_zero() {
    let dir = setup_temp_dir();
    let mut registry = ShareRegistry::new();
    assert_eq!(registry.add_folder(&dir.path().join("missing")), 0);
    assert!(registry.is_empty());
}

#[test]
fn remove_ignores_unknown_paths() {
    let dir = setup_temp_dir();
    let kept = write_file(dir.path(), "kept.txt", 1);
    let gone = write_file(dir.path(), "gone.txt", 1);
    let mut registry = ShareRegistry::new();
    registry.add(&kept);
    registry.add(&gone);

    let removed = registry.remove(&HashSet::from([gone.clone(), dir.path().join("never-shared")]));

    assert_eq!(removed, 1);
    assert!(registry.contains(&kept));
    assert!(!registry.contains(&gone));
}

#[test]
fn previously_issued_receiver_sees_rebuilt_ids() {
    let dir = setup_temp_dir();
    let first = write_file(dir.path(), "first.txt", 1);
    let second = write_file(dir.path(), "second.txt", 1);
    let mut registry = ShareRegistry::new();
    let rx = registry.subscribe();

    registry.add(&first);
    registry.add(&second);
    assert_eq!(rx.borrow()[1].name, "second.txt");

    registry.remove(&HashSet::from([first]));
    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, 0);
    assert_eq!(snapshot[0].name, "second.txt");
}
