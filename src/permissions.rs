//! Permission normalization of the converted filesystem.
//!
//! Docker images are built and run as root, so plenty of files are only
//! readable or executable by their owner. Singularity runs as the calling
//! user, which makes those files unusable. The normalizer opens the tree up in
//! two phases:
//!
//! 1. every top-level entry is made world-readable, recursively;
//! 2. every entry that is owner-executable but not other-executable becomes
//!    world-executable.
//!
//! `/dev`, `/proc` and `/sys` are never traversed.
//!
//! Both phases are expressed as `find` invocations run through a [`Shell`]
//! inside the target image, because the image is only reachable through the
//! target runtime. Which `find` dialect is safe to use depends on the image's
//! userland, so the rules come from a [`PermissionTraversal`] picked by the
//! detected [`DistroFamily`].

use anyhow::{Context, Result};
use log::debug;

/// Pseudo-filesystems that must never be touched.
pub const RESERVED_SUBTREES: &[&str] = &["dev", "proc", "sys"];

/// File inspected to recognize the distribution.
pub const RELEASE_FILE: &str = "etc/issue";

/// Something able to run a POSIX shell script against the tree being normalized.
pub trait Shell {
    /// Runs `script` with `/bin/sh -c` and returns its standard output.
    /// A non-zero exit status is an error.
    fn run(&self, script: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    /// Ubuntu, Debian and derivatives: GNU findutils are available.
    DebianLike,
    /// Anything else, including busybox based images.
    Other,
}

impl DistroFamily {
    /// Classifies the first line of the release file.
    pub fn from_release_line(line: &str) -> Self {
        if line.contains("Ubuntu") || line.contains("Debian") {
            DistroFamily::DebianLike
        } else {
            DistroFamily::Other
        }
    }

    pub fn traversal(self) -> Box<dyn PermissionTraversal> {
        match self {
            DistroFamily::DebianLike => Box::new(RaceTolerantTraversal),
            DistroFamily::Other => Box::new(ManualExclusionTraversal),
        }
    }
}

/// Builds the shell rules for both normalization phases below `root`.
pub trait PermissionTraversal {
    fn name(&self) -> &'static str;

    /// Phase 1: recursive world-read on every top-level entry.
    fn read_rule(&self, root: &str) -> String {
        let root = Root::new(root);
        let mut rule = format!("find {} -maxdepth 0", root.top_level_glob());
        for reserved in RESERVED_SUBTREES {
            rule.push_str(&format!(" ! -path {}", root.quoted_child(reserved)));
        }
        rule.push_str(" -exec chmod -R a+r {} +");
        rule
    }

    /// Phase 2: world-execute on owner-executable entries.
    fn execute_rule(&self, root: &str) -> String;
}

/// GNU `find` with `-ignore_readdir_race`, confined to one filesystem.
pub struct RaceTolerantTraversal;

impl PermissionTraversal for RaceTolerantTraversal {
    fn name(&self) -> &'static str {
        "race-tolerant"
    }

    fn execute_rule(&self, root: &str) -> String {
        let root = Root::new(root);
        format!(
            "find {} -xdev -ignore_readdir_race {} -prune -o {} -exec chmod a+x {{}} +",
            root.quoted(),
            root.reserved_match(),
            OWNER_ONLY_EXECUTABLE
        )
    }
}

/// Plain POSIX `find` for minimal userlands (busybox, BSD).
///
/// There is no readdir race flag here, so entries vanishing mid-scan make
/// `find` exit non-zero. The exit status is discarded, which swallows every
/// other phase 2 failure too (a `chmod` refused by the filesystem, a missing
/// `find`). Diagnostics are folded into the output and logged at debug level.
pub struct ManualExclusionTraversal;

impl PermissionTraversal for ManualExclusionTraversal {
    fn name(&self) -> &'static str {
        "manual-exclusion"
    }

    fn execute_rule(&self, root: &str) -> String {
        let root = Root::new(root);
        format!(
            "find {} {} -prune -o {} -exec chmod a+x {{}} + 2>&1 || true",
            root.quoted(),
            root.reserved_match(),
            OWNER_ONLY_EXECUTABLE
        )
    }
}

/// `u+x` set and `o+x` unset, in octal for portability.
const OWNER_ONLY_EXECUTABLE: &str = "-perm -0100 ! -perm -0001";

/// Normalized traversal root. `/` is kept apart so children render as `/dev`
/// rather than `//dev`.
struct Root<'a>(&'a str);

impl<'a> Root<'a> {
    fn new(root: &'a str) -> Self {
        Root(root.trim_end_matches('/'))
    }

    fn quoted(&self) -> String {
        if self.0.is_empty() {
            "/".to_string()
        } else {
            shell_quote(self.0)
        }
    }

    /// Glob over the top-level entries, left unquoted so the shell expands it.
    fn top_level_glob(&self) -> String {
        if self.0.is_empty() {
            "/*".to_string()
        } else {
            format!("{}/*", shell_quote(self.0))
        }
    }

    fn quoted_child(&self, child: &str) -> String {
        shell_quote(&format!("{}/{}", self.0, child))
    }

    fn reserved_match(&self) -> String {
        let alternatives: Vec<String> = RESERVED_SUBTREES
            .iter()
            .map(|reserved| format!("-path {}", self.quoted_child(reserved)))
            .collect();
        format!("\\( {} \\)", alternatives.join(" -o "))
    }
}

/// Single-quotes `value` for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// The two rules selected for one normalization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPlan {
    pub family: DistroFamily,
    pub read_rule: String,
    pub execute_rule: String,
}

impl PermissionPlan {
    pub fn new(family: DistroFamily, root: &str) -> Self {
        let traversal = family.traversal();
        debug!(
            "Using {} traversal for {:?} userland",
            traversal.name(),
            family
        );
        Self {
            family,
            read_rule: traversal.read_rule(root),
            execute_rule: traversal.execute_rule(root),
        }
    }

    pub fn apply(&self, shell: &dyn Shell) -> Result<()> {
        debug!("Granting world-read: {}", self.read_rule);
        shell
            .run(&self.read_rule)
            .context("Failed to grant read permissions")?;

        debug!("Granting world-execute: {}", self.execute_rule);
        let output = shell
            .run(&self.execute_rule)
            .context("Failed to grant execute permissions")?;
        if !output.trim().is_empty() {
            debug!("World-execute pass reported: {}", output.trim());
        }
        Ok(())
    }
}

/// Reads the first line of the release file under `root` and classifies it.
/// A missing or unreadable file counts as [`DistroFamily::Other`].
pub fn detect_family(shell: &dyn Shell, root: &str) -> Result<DistroFamily> {
    let release = format!("{}/{}", Root::new(root).0, RELEASE_FILE);
    let output = shell
        .run(&format!(
            "head -n 1 {} 2>/dev/null || true",
            shell_quote(&release)
        ))
        .context("Failed to read release file")?;

    let line = output.lines().next().unwrap_or("");
    debug!("Release identification: {:?}", line);
    Ok(DistroFamily::from_release_line(line))
}

/// Detects the distribution family and applies the matching plan.
pub fn normalize(shell: &dyn Shell, root: &str) -> Result<DistroFamily> {
    let family = detect_family(shell, root)?;
    PermissionPlan::new(family, root).apply(shell)?;
    Ok(family)
}
