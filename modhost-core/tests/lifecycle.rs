//! Lifecycle integration tests: refresh idempotence, the state machine
//! across a six-category fixture set, retries, requery, and shutdown.

mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use common::{manager_with_fake_loader, write_plugin};
use modhost_core::{DependencyError, Error, Manager, PluginState};

/// The reference fixture set: one plugin per lifecycle category.
fn write_fixture_set(dir: &Path) {
    write_plugin(dir, "ordinary.fake", "id = \"test/ordinary\"\n");
    write_plugin(
        dir,
        "load-fails.fake",
        "id = \"test/load-fails\"\nload_fails = true\n",
    );
    write_plugin(
        dir,
        "load-panics.fake",
        "id = \"test/load-panics\"\nload_panics = true\n",
    );
    write_plugin(
        dir,
        "unload-fails.fake",
        "id = \"test/unload-fails\"\nunload_fails = true\n",
    );
    write_plugin(
        dir,
        "dependent.fake",
        "id = \"test/dependent\"\ndependencies = [\"test/ordinary\"]\n",
    );
    write_plugin(
        dir,
        "broken-dependent.fake",
        "id = \"test/broken-dependent\"\ndependencies = [\"test/missing\"]\n",
    );
}

fn load_all_queried(manager: &mut Manager) {
    let mut queried = manager.find_plugins_with_state(PluginState::Queried);
    queried.sort_by(|a, b| a.info().id().cmp(b.info().id()));
    for plugin in queried {
        let _ = manager.load_plugin(&plugin);
    }
}

fn unload_all_loaded(manager: &mut Manager) {
    let mut loaded = manager.find_plugins_with_state(PluginState::Loaded);
    loaded.sort_by(|a, b| a.info().id().cmp(b.info().id()));
    for plugin in loaded {
        let _ = manager.unload_plugin(&plugin);
    }
}

fn states_by_id(manager: &Manager) -> BTreeMap<String, PluginState> {
    manager
        .list_plugins()
        .into_iter()
        .filter_map(|id| {
            manager
                .find_plugin(&id)
                .map(|p| (id, p.state()))
        })
        .collect()
}

#[test]
fn test_refresh_queries_all_fixture_plugins() {
    let dir = TempDir::new().unwrap();
    write_fixture_set(dir.path());
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());

    manager.refresh();

    assert_eq!(manager.plugin_count(), 6);
    assert_eq!(
        manager.find_plugins_with_state(PluginState::Queried).len(),
        6
    );
}

#[test]
fn test_refresh_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_fixture_set(dir.path());
    let (mut manager, loader) = manager_with_fake_loader(dir.path());

    manager.refresh();
    let first = (manager.plugin_count(), states_by_id(&manager));

    manager.refresh();
    manager.refresh();
    let third = (manager.plugin_count(), states_by_id(&manager));

    assert_eq!(first, third);
    // Each plugin was queried exactly once across all three refreshes.
    assert_eq!(loader.queries_of("test/ordinary"), 1);
    assert_eq!(loader.queries_of("test/dependent"), 1);
}

#[test]
fn test_load_all_fixture_counts() {
    let dir = TempDir::new().unwrap();
    write_fixture_set(dir.path());
    let (mut manager, loader) = manager_with_fake_loader(dir.path());

    manager.refresh();
    load_all_queried(&mut manager);

    assert_eq!(
        manager.find_plugins_with_state(PluginState::Loaded).len(),
        3,
        "ordinary, unload-fails, and dependent load"
    );
    assert_eq!(
        manager
            .find_plugins_with_state(PluginState::LoadFailed)
            .len(),
        2,
        "load-fails and load-panics fail"
    );

    // The broken dependent never reached its own loader and keeps its
    // pre-call state.
    let broken = manager.find_plugin("test/broken-dependent").unwrap();
    assert_eq!(broken.state(), PluginState::Queried);
    assert!(broken.error().is_none());
    assert_eq!(loader.loads_of("test/broken-dependent"), 0);

    // Failed plugins carry their error and keep wanting to be loaded.
    let failed = manager.find_plugin("test/load-fails").unwrap();
    assert!(failed.error().is_some());
    assert_eq!(failed.desired_state(), PluginState::Loaded);
}

#[test]
fn test_unload_all_fixture_counts() {
    let dir = TempDir::new().unwrap();
    write_fixture_set(dir.path());
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());

    manager.refresh();
    load_all_queried(&mut manager);
    unload_all_loaded(&mut manager);

    // ordinary and dependent return to queried; broken-dependent never
    // left it.
    assert_eq!(
        manager.find_plugins_with_state(PluginState::Queried).len(),
        3
    );
    assert_eq!(
        manager
            .find_plugins_with_state(PluginState::UnloadFailed)
            .len(),
        1
    );
    assert_eq!(
        manager
            .find_plugins_with_state(PluginState::LoadFailed)
            .len(),
        2
    );

    let stuck = manager.find_plugin("test/unload-fails").unwrap();
    assert!(stuck.error().is_some());
    assert_eq!(stuck.desired_state(), PluginState::Queried);
}

#[test]
fn test_load_of_loaded_plugin_is_noop() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "ordinary.fake", "id = \"test/ordinary\"\n");
    let (mut manager, loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let plugin = manager.find_plugin("test/ordinary").unwrap();
    manager.load_plugin(&plugin).unwrap();
    manager.load_plugin(&plugin).unwrap();

    assert_eq!(plugin.state(), PluginState::Loaded);
    assert_eq!(loader.loads_of("test/ordinary"), 1);
}

#[test]
fn test_unload_of_never_loaded_plugin_is_noop() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "ordinary.fake", "id = \"test/ordinary\"\n");
    let (mut manager, loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let plugin = manager.find_plugin("test/ordinary").unwrap();
    manager.unload_plugin(&plugin).unwrap();

    assert_eq!(plugin.state(), PluginState::Queried);
    assert_eq!(loader.unloads_of("test/ordinary"), 0);
}

#[test]
fn test_load_failed_retry_can_succeed() {
    let dir = TempDir::new().unwrap();
    write_plugin(
        dir.path(),
        "flaky.fake",
        "id = \"test/flaky\"\nload_fails = true\n",
    );
    let (mut manager, loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let plugin = manager.find_plugin("test/flaky").unwrap();
    let err = manager.load_plugin(&plugin).unwrap_err();
    assert!(matches!(err, Error::LoadFailure { .. }));
    assert_eq!(plugin.state(), PluginState::LoadFailed);

    // Still failing on a second attempt.
    assert!(manager.load_plugin(&plugin).is_err());
    assert_eq!(plugin.state(), PluginState::LoadFailed);

    loader.set_load_fails("test/flaky", false);
    manager.load_plugin(&plugin).unwrap();
    assert_eq!(plugin.state(), PluginState::Loaded);
    assert!(plugin.error().is_none());
}

#[test]
fn test_unload_failed_retry_can_succeed() {
    let dir = TempDir::new().unwrap();
    write_plugin(
        dir.path(),
        "sticky.fake",
        "id = \"test/sticky\"\nunload_fails = true\n",
    );
    let (mut manager, loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let plugin = manager.find_plugin("test/sticky").unwrap();
    manager.load_plugin(&plugin).unwrap();

    let err = manager.unload_plugin(&plugin).unwrap_err();
    assert!(matches!(err, Error::UnloadFailure { .. }));
    assert_eq!(plugin.state(), PluginState::UnloadFailed);
    assert_eq!(plugin.desired_state(), PluginState::Queried);

    loader.set_unload_fails("test/sticky", false);
    manager.unload_plugin(&plugin).unwrap();
    assert_eq!(plugin.state(), PluginState::Queried);
    assert!(plugin.error().is_none());
}

#[test]
fn test_auto_load_after_refresh() {
    let dir = TempDir::new().unwrap();
    write_plugin(
        dir.path(),
        "eager.fake",
        "id = \"test/eager\"\nauto_load = true\n",
    );
    write_plugin(dir.path(), "lazy.fake", "id = \"test/lazy\"\n");
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());

    manager.refresh();

    assert_eq!(
        manager.find_plugin("test/eager").unwrap().state(),
        PluginState::Loaded
    );
    assert_eq!(
        manager.find_plugin("test/lazy").unwrap().state(),
        PluginState::Queried
    );
}

#[test]
fn test_state_change_notifications_fire_in_order() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "ordinary.fake", "id = \"test/ordinary\"\n");
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.on_state_changed(move |plugin, old, new| {
        sink.lock()
            .unwrap()
            .push((plugin.info().id().to_string(), old, new));
    });

    manager.refresh();
    let plugin = manager.find_plugin("test/ordinary").unwrap();
    manager.load_plugin(&plugin).unwrap();
    manager.unload_plugin(&plugin).unwrap();

    let seen = seen.lock().unwrap();
    let transitions: Vec<_> = seen
        .iter()
        .filter(|(id, _, _)| id == "test/ordinary")
        .map(|(_, old, new)| (*old, *new))
        .collect();
    assert_eq!(
        transitions,
        [
            (PluginState::Unknown, PluginState::Queried),
            (PluginState::Queried, PluginState::Loaded),
            (PluginState::Loaded, PluginState::Queried),
        ]
    );
}

#[test]
fn test_changed_file_is_requeried() {
    let dir = TempDir::new().unwrap();
    write_plugin(
        dir.path(),
        "mutable.fake",
        "id = \"test/mutable\"\npriority = 1\n",
    );
    let (mut manager, loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let before = manager.find_plugin("test/mutable").unwrap();
    assert_eq!(before.info().priority(), 1);

    // Make sure the rewrite lands with a strictly newer mtime.
    std::thread::sleep(std::time::Duration::from_millis(30));
    write_plugin(
        dir.path(),
        "mutable.fake",
        "id = \"test/mutable\"\npriority = 2\n",
    );
    manager.refresh();

    assert_eq!(manager.plugin_count(), 1);
    let after = manager.find_plugin("test/mutable").unwrap();
    assert_eq!(after.state(), PluginState::Queried);
    assert_eq!(after.info().priority(), 2);
    assert_eq!(loader.queries_of("test/mutable"), 2);
}

#[test]
fn test_removed_file_is_evicted() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "keep.fake", "id = \"test/keep\"\n");
    let doomed = write_plugin(dir.path(), "doomed.fake", "id = \"test/doomed\"\n");
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());

    manager.refresh();
    assert_eq!(manager.plugin_count(), 2);

    std::fs::remove_file(doomed).unwrap();
    manager.refresh();

    assert_eq!(manager.plugin_count(), 1);
    assert!(manager.find_plugin("test/doomed").is_none());
    assert!(manager.find_plugin("test/keep").is_some());
}

#[test]
fn test_malformed_manifest_does_not_stop_the_scan() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "broken.fake", "this is [not toml\n");
    write_plugin(dir.path(), "good.fake", "id = \"test/good\"\n");
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());

    manager.refresh();

    assert_eq!(manager.plugin_count(), 1);
    assert_eq!(
        manager.find_plugin("test/good").unwrap().state(),
        PluginState::Queried
    );
}

#[test]
fn test_shutdown_unloads_in_reverse_load_order() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "first.fake", "id = \"test/first\"\n");
    write_plugin(dir.path(), "second.fake", "id = \"test/second\"\n");
    let (mut manager, loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let first = manager.find_plugin("test/first").unwrap();
    let second = manager.find_plugin("test/second").unwrap();
    manager.load_plugin(&first).unwrap();
    manager.load_plugin(&second).unwrap();

    manager.shutdown();

    assert_eq!(
        loader.unload_order(),
        [
            ("test/second".to_string(), true),
            ("test/first".to_string(), true),
        ]
    );
    assert_eq!(manager.plugin_count(), 0);
    assert_eq!(first.state(), PluginState::Queried);
}

#[test]
fn test_broken_dependency_load_error_is_distinct() {
    let dir = TempDir::new().unwrap();
    write_fixture_set(dir.path());
    let (mut manager, _loader) = manager_with_fake_loader(dir.path());
    manager.refresh();

    let broken = manager.find_plugin("test/broken-dependent").unwrap();
    let err = manager.load_plugin(&broken).unwrap_err();
    assert!(matches!(
        err,
        Error::Dependency(DependencyError::Missing { .. })
    ));
    assert_eq!(err.domain(), "dependency");
}
