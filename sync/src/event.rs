//! Mirror events and their translation from raw notifications

use std::path::{Path, PathBuf};
use notify::event::{EventKind, ModifyKind, RenameMode};

/// A change observed under the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// A file or directory appeared
    Created(PathBuf),
    /// A file's contents changed
    Modified(PathBuf),
    /// A file or directory went away
    Removed(PathBuf),
}

impl MirrorEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::Modified(path) | Self::Removed(path) => path,
        }
    }

    /// Translate one raw notification into mirror events, one per path.
    ///
    /// Access and metadata-only notifications produce nothing. Renames are
    /// split into a removal of the old name and a creation of the new one.
    pub fn from_notify(event: notify::Event) -> Vec<MirrorEvent> {
        let notify::Event { kind, paths, .. } = event;

        match kind {
            EventKind::Create(_) => paths.into_iter().map(Self::Created).collect(),
            EventKind::Remove(_) => paths.into_iter().map(Self::Removed).collect(),
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(ModifyKind::Name(mode)) => from_rename(mode, paths),
            EventKind::Modify(_) => paths.into_iter().map(Self::Modified).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}

fn from_rename(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<MirrorEvent> {
    match mode {
        RenameMode::From => paths.into_iter().map(MirrorEvent::Removed).collect(),
        RenameMode::To => paths.into_iter().map(MirrorEvent::Created).collect(),
        RenameMode::Both => {
            let mut paths = paths.into_iter();
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(MirrorEvent::Removed(from));
            }
            events.extend(paths.map(MirrorEvent::Created));
            events
        }
        // The backend could not tell which half this is; the filesystem can
        RenameMode::Any | RenameMode::Other => paths
            .into_iter()
            .map(|path| {
                if path.symlink_metadata().is_ok() {
                    MirrorEvent::Created(path)
                } else {
                    MirrorEvent::Removed(path)
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use tempfile::TempDir;
    use test_case::test_case;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test_case(EventKind::Create(CreateKind::File), MirrorEvent::Created(PathBuf::from("/s/A.class")) ; "create file")]
    #[test_case(EventKind::Create(CreateKind::Folder), MirrorEvent::Created(PathBuf::from("/s/A.class")) ; "create folder")]
    #[test_case(EventKind::Modify(ModifyKind::Data(DataChange::Content)), MirrorEvent::Modified(PathBuf::from("/s/A.class")) ; "modify data")]
    #[test_case(EventKind::Modify(ModifyKind::Any), MirrorEvent::Modified(PathBuf::from("/s/A.class")) ; "modify any")]
    #[test_case(EventKind::Remove(RemoveKind::Any), MirrorEvent::Removed(PathBuf::from("/s/A.class")) ; "remove")]
    #[test_case(EventKind::Modify(ModifyKind::Name(RenameMode::From)), MirrorEvent::Removed(PathBuf::from("/s/A.class")) ; "rename from")]
    #[test_case(EventKind::Modify(ModifyKind::Name(RenameMode::To)), MirrorEvent::Created(PathBuf::from("/s/A.class")) ; "rename to")]
    fn test_single_path_translation(kind: EventKind, expected: MirrorEvent) {
        assert_eq!(MirrorEvent::from_notify(event(kind, &["/s/A.class"])), vec![expected]);
    }

    #[test_case(EventKind::Access(AccessKind::Any) ; "access")]
    #[test_case(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)) ; "metadata")]
    #[test_case(EventKind::Any ; "any")]
    #[test_case(EventKind::Other ; "other")]
    fn test_ignored_kinds(kind: EventKind) {
        assert!(MirrorEvent::from_notify(event(kind, &["/s/A.class"])).is_empty());
    }

    #[test]
    fn test_rename_both_is_remove_then_create() {
        let events = MirrorEvent::from_notify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/s/Old.class", "/s/New.class"],
        ));

        assert_eq!(
            events,
            vec![
                MirrorEvent::Removed(PathBuf::from("/s/Old.class")),
                MirrorEvent::Created(PathBuf::from("/s/New.class")),
            ]
        );
    }

    #[test]
    fn test_ambiguous_rename_checks_the_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("here.class");
        let absent = temp_dir.path().join("gone.class");
        std::fs::write(&present, b"x").unwrap();

        let events = MirrorEvent::from_notify(
            notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
                .add_path(present.clone())
                .add_path(absent.clone()),
        );

        assert_eq!(
            events,
            vec![MirrorEvent::Created(present), MirrorEvent::Removed(absent)]
        );
    }

    #[test]
    fn test_every_path_produces_an_event() {
        let events = MirrorEvent::from_notify(event(
            EventKind::Remove(RemoveKind::File),
            &["/s/a", "/s/b", "/s/c"],
        ));

        assert_eq!(events.len(), 3);
        assert_eq!(events[2].path(), Path::new("/s/c"));
    }
}
