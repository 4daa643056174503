// Shader hot reload
//
// Watches the compiled shader directory. The editor polls once per frame and
// rebuilds every material whose shaders changed.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    dir: PathBuf,
}

impl ShaderWatcher {
    pub fn new(dir: impl AsRef<Path>) -> notify::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let (tx, events) = channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        log::info!("Watching {:?} for shader changes", dir);
        Ok(Self {
            _watcher: watcher,
            events,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Drain pending events; each changed `.spv` file is listed once
    pub fn changed_shaders(&self) -> Vec<PathBuf> {
        let events = self.events.try_iter().filter_map(|event| match event {
            Ok(event) => Some(event),
            Err(e) => {
                log::warn!("Shader watcher error: {}", e);
                None
            }
        });
        changed_spirv(events)
    }
}

fn changed_spirv(events: impl IntoIterator<Item = Event>) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = Vec::new();
    for event in events {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }
        for path in event.paths {
            let is_spirv = path.extension().is_some_and(|ext| ext == "spv");
            if is_spirv && !changed.contains(&path) {
                changed.push(path);
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn repeated_writes_are_reported_once() {
        let modify = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        let changed = changed_spirv(vec![
            event(modify, "shaders/mesh.frag.spv"),
            event(EventKind::Create(CreateKind::File), "shaders/skybox.vert.spv"),
            event(modify, "shaders/mesh.frag.spv"),
        ]);
        assert_eq!(
            changed,
            vec![PathBuf::from("shaders/mesh.frag.spv"), PathBuf::from("shaders/skybox.vert.spv")]
        );
    }

    #[test]
    fn sources_and_removals_are_ignored() {
        let modify = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        let changed = changed_spirv(vec![
            event(modify, "shaders/mesh.frag"),
            event(EventKind::Remove(RemoveKind::File), "shaders/mesh.vert.spv"),
        ]);
        assert!(changed.is_empty());
    }

    #[test]
    fn watches_an_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = ShaderWatcher::new(dir.path()).unwrap();
        assert_eq!(watcher.dir(), dir.path());
        assert!(watcher.changed_shaders().is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ShaderWatcher::new(dir.path().join("missing")).is_err());
    }
}
