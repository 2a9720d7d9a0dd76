//! Event and filter rebasing between a child back-end's own namespace and
//! the parent virtual filesystem namespace it is mounted under.

use vfs_model::Event;
use vfs_path::{GlobFilter, PathConverter, VPath};

/// Rebases `filter` (expressed in the parent namespace) onto the namespace a
/// back-end mounted at `mount_path` sees locally, honoring `sub_path` if the
/// assignment declares one.
///
/// When `filter`'s pattern cannot be unambiguously stripped of the mount's
/// prefix (a wildcard segment overlaps it), this falls back to matching
/// everything in the child's namespace; the caller already confirmed the
/// filter intersects this subtree, so over-approximating here only costs a
/// few events dropped later at the rewrite step, never a missed one.
pub(crate) fn restrict_filter(filter: &GlobFilter, mount_path: &VPath, sub_path: Option<&str>) -> GlobFilter {
    let pattern = filter.pattern();
    let mount_str = mount_path.as_str();
    let relative = if mount_str.is_empty() {
        pattern.to_owned()
    } else {
        let prefix = format!("{}/", mount_str.trim_end_matches('/'));
        match pattern.strip_prefix(prefix.as_str()) {
            Some(rest) => rest.to_owned(),
            None => "**".to_owned(),
        }
    };
    let rebased = match sub_path {
        Some(sp) if !sp.is_empty() => format!("{}/{relative}", sp.trim_end_matches('/')),
        _ => relative,
    };
    GlobFilter::compile(&rebased).unwrap_or_else(|_| GlobFilter::match_all())
}

/// Rewrites every path carried by `event` from the child back-end's own
/// namespace into the parent namespace via `converter`, dropping the event
/// (returning `None`) if any carried path no longer lies under the
/// converter's source root — expected when a mount is reshaped out from
/// under a still-draining child observer, not an error worth surfacing.
pub(crate) fn rewrite_event(event: Event, converter: &PathConverter) -> Option<Event> {
    match event {
        Event::Start => Some(Event::Start),
        Event::Create(path) => convert(converter, path).map(Event::Create),
        Event::Change(path) => convert(converter, path).map(Event::Change),
        Event::Delete(path) => convert(converter, path).map(Event::Delete),
        Event::Rename(old, new) => {
            let old = convert(converter, old)?;
            let new = convert(converter, new)?;
            Some(Event::Rename(old, new))
        }
        Event::Error(err, path) => {
            let path = match path {
                Some(p) => Some(convert(converter, p)?),
                None => None,
            };
            Some(Event::Error(err, path))
        }
        Event::Mount(path, assignments, option) => convert(converter, path).map(|p| Event::Mount(p, assignments, option)),
        Event::Unmount(path) => convert(converter, path).map(Event::Unmount),
        _ => None,
    }
}

fn convert(converter: &PathConverter, path: VPath) -> Option<VPath> {
    converter.convert(path.as_str()).ok().map(VPath::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfs_error::VfsError;

    #[test]
    fn restrict_filter_strips_mount_prefix() {
        let filter = GlobFilter::compile("data/sub/*.txt").unwrap();
        let restricted = restrict_filter(&filter, &VPath::from("data"), None);
        assert_eq!(restricted.pattern(), "sub/*.txt");
    }

    #[test]
    fn restrict_filter_prepends_sub_path() {
        let filter = GlobFilter::compile("data/sub/*.txt").unwrap();
        let restricted = restrict_filter(&filter, &VPath::from("data"), Some("/inner"));
        assert_eq!(restricted.pattern(), "/inner/sub/*.txt");
    }

    #[test]
    fn restrict_filter_falls_back_to_match_all_on_ambiguous_overlap() {
        let filter = GlobFilter::compile("*/sub/*.txt").unwrap();
        let restricted = restrict_filter(&filter, &VPath::from("data"), None);
        assert_eq!(restricted.pattern(), "**");
    }

    #[test]
    fn rewrite_event_splices_create_path_into_parent_namespace() {
        let converter = PathConverter::new(VPath::root(), VPath::from("data"));
        let rewritten = rewrite_event(Event::Create(VPath::from("sub/a.txt")), &converter).unwrap();
        assert_eq!(rewritten.path(), Some(&VPath::from("data/sub/a.txt")));
    }

    #[test]
    fn rewrite_event_splices_both_rename_paths() {
        let converter = PathConverter::new(VPath::root(), VPath::from("data"));
        let rewritten = rewrite_event(Event::Rename(VPath::from("a"), VPath::from("b")), &converter).unwrap();
        assert_eq!(rewritten.path(), Some(&VPath::from("data/a")));
        assert_eq!(rewritten.new_path(), Some(&VPath::from("data/b")));
    }

    #[test]
    fn rewrite_event_drops_errors_carrying_unconvertible_paths() {
        let converter = PathConverter::new(VPath::from("only-under-here"), VPath::from("data"));
        let rewritten = rewrite_event(Event::Error(VfsError::Cancelled, Some(VPath::from("elsewhere"))), &converter);
        assert!(rewritten.is_none());
    }

    #[test]
    fn rewrite_event_passes_through_errors_with_no_path() {
        let converter = PathConverter::new(VPath::root(), VPath::from("data"));
        let rewritten = rewrite_event(Event::Error(VfsError::Cancelled, None), &converter).unwrap();
        assert!(matches!(rewritten, Event::Error(_, None)));
    }
}
