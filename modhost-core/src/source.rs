//! Source - pluggable scan strategies driven by the manager's refresh

use crate::file_tree::FileTree;
use crate::manager::Manager;

/// A scan strategy the manager drives during refresh.
///
/// `scan` is called repeatedly until it returns `false`, meaning "no new
/// unqueried plugin was found this pass". The level-triggered protocol
/// exists because one pass can change what the next pass finds: a newly
/// queried plugin can make a dependency resolvable, and a requery marker
/// surfaces files that need querying again.
pub trait Source: Send {
    fn scan(&mut self, manager: &mut Manager) -> bool;
}

/// The default filesystem source.
///
/// Walks a [`FileTree`] over the manager's search paths and queries every
/// file whose extension matches a registered loader and whose plugin is
/// not already indexed in a settled state.
#[derive(Debug, Default)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }
}

impl Source for FileSource {
    fn scan(&mut self, manager: &mut Manager) -> bool {
        let tree = FileTree::build(manager.paths());
        let mut found = false;

        for dir in tree.directories() {
            for file in dir.files() {
                let Some(extension) = file.extension() else {
                    continue;
                };
                let Some(loader) = manager.loader_for_extension(extension) else {
                    continue;
                };
                if !manager.needs_query(file.path()) {
                    continue;
                }

                match loader.query(file.path()) {
                    Ok(queried) => {
                        manager.index_queried(file.path(), queried, &loader);
                        found = true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            file = %file.path().display(),
                            error = %e,
                            "Plugin query failed"
                        );
                    }
                }
            }
        }

        found
    }
}
