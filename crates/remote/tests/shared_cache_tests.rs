//! Two machines sharing a remote cache directory

use buildstash_cache::{
    CacheConfig, CacheEngine, CacheEntry, CacheTier, ExpectedFile, ExpectedFiles,
    LocalCache, StoredFile, TierKind,
};
use buildstash_remote::create_remote_tier;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn machine(workspace: &Path, name: &str, remote: &str) -> (Arc<LocalCache>, CacheEngine) {
    let mut config = CacheConfig::with_root(workspace.join(name).join("cache"));
    config.remote = Some(remote.to_string());
    let local = Arc::new(LocalCache::open(&config.root_dir).unwrap());
    let remote = create_remote_tier(&config).unwrap();
    let engine = CacheEngine::new(local.clone(), remote, config.engine_config());
    (local, engine)
}

fn expected(dir: &Path) -> ExpectedFiles {
    let mut files = ExpectedFiles::new();
    files.insert("obj".into(), ExpectedFile::new(dir.join("out/main.o")));
    files
}

#[test]
fn entry_stored_on_one_machine_hits_on_another() {
    let temp = TempDir::new().unwrap();
    let shared = temp.path().join("shared");
    fs::create_dir_all(&shared).unwrap();
    let remote = format!("file://{}", shared.display());

    let (_, engine_a) = machine(temp.path(), "a", &remote);
    let (local_b, engine_b) = machine(temp.path(), "b", &remote);

    let files_a = expected(&temp.path().join("a"));
    let entry = CacheEntry::new(0)
        .with_file("obj", StoredFile::Inline(b"main object".to_vec()))
        .with_output("compiled main.c", "");
    engine_a.add("5e1f00", &entry, &files_a, false);

    let files_b = expected(&temp.path().join("b"));
    let hit = engine_b.lookup("5e1f00", &files_b, false, true).unwrap();
    assert_eq!(hit.tier, TierKind::Remote);
    assert_eq!(hit.std_out, b"compiled main.c");
    assert_eq!(
        fs::read(temp.path().join("b/out/main.o")).unwrap(),
        b"main object"
    );

    // Promoted on machine b
    assert!(local_b.find("5e1f00").unwrap().is_some());
    let again = engine_b.lookup("5e1f00", &files_b, false, true).unwrap();
    assert_eq!(again.tier, TierKind::Local);
}

#[test]
fn unmounted_remote_degrades_to_local_only() {
    let temp = TempDir::new().unwrap();
    let remote = format!("file://{}", temp.path().join("unmounted").display());
    let (local, engine) = machine(temp.path(), "a", &remote);
    let files = expected(&temp.path().join("a"));

    assert!(engine.lookup("5e1f00", &files, false, true).is_none());
    let entry = CacheEntry::new(0).with_file("obj", StoredFile::Inline(b"X".to_vec()));
    engine.add("5e1f00", &entry, &files, false);

    assert!(local.find("5e1f00").unwrap().is_some());
    let hit = engine.lookup("5e1f00", &files, false, true).unwrap();
    assert_eq!(hit.tier, TierKind::Local);
    assert!(!temp.path().join("unmounted").exists());
}

#[test]
fn read_only_remote_is_left_untouched() {
    let temp = TempDir::new().unwrap();
    let shared = temp.path().join("shared");
    fs::create_dir_all(&shared).unwrap();

    let mut config = CacheConfig::with_root(temp.path().join("cache"));
    config.remote = Some(format!("file://{}", shared.display()));
    config.remote_read_only = true;
    let local = Arc::new(LocalCache::open(&config.root_dir).unwrap());
    let remote = create_remote_tier(&config).unwrap();
    let engine = CacheEngine::new(local, remote, config.engine_config());
    assert!(engine.config().remote_read_only);

    let files = expected(temp.path());
    let entry = CacheEntry::new(0).with_file("obj", StoredFile::Inline(b"X".to_vec()));
    engine.add("5e1f00", &entry, &files, false);
    assert!(!shared.join("5e1f00").exists());
}
