use git2::Repository;
use std::path::Path;

/// Blank or whitespace-only strings are stored as NULL, never as "".
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// Escapes `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Checked-out branch of the worktree, if it is a git checkout on a branch.
pub fn current_branch(worktree: &Path) -> Option<String> {
    let repo = match Repository::open(worktree) {
        Ok(repo) => repo,
        Err(err) => {
            log::debug!(
                "Skipping branch lookup: failed to open repo '{}': {err}",
                worktree.display()
            );
            return None;
        }
    };
    let head = repo.head().ok()?;
    if !head.is_branch() {
        return None;
    }
    head.shorthand().map(str::to_string)
}

/// Name shown for a session when the caller did not supply one.
pub fn default_session_name(worktree: &Path, profile_name: &str) -> String {
    match worktree.file_name() {
        Some(name) => format!("{} ({profile_name})", name.to_string_lossy()),
        None => profile_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn blank_strings_become_none() {
        assert_eq!(normalize_optional(Some("   ")), None);
        assert_eq!(normalize_optional(Some("")), None);
        assert_eq!(normalize_optional(None), None);
        assert_eq!(normalize_optional(Some(" td-1 ")), Some("td-1".to_string()));
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }

    #[test]
    fn branch_of_fresh_repository() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("refs/heads/feature-x"), &sig, &sig, "init", &tree, &[])
            .unwrap();
        repo.set_head("refs/heads/feature-x").unwrap();

        assert_eq!(current_branch(temp.path()).as_deref(), Some("feature-x"));
    }

    #[test]
    fn non_repository_has_no_branch() {
        let temp = TempDir::new().unwrap();
        assert_eq!(current_branch(temp.path()), None);
    }

    #[test]
    fn default_name_uses_worktree_folder() {
        assert_eq!(
            default_session_name(Path::new("/repo/wt-a"), "Claude Code"),
            "wt-a (Claude Code)"
        );
    }
}
