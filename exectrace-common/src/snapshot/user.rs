use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path};

use super::{DirChain, ExecSnapshot, ExecVector};
use crate::string::String;

impl<S: AsRef<[u8]>> ExecVector for [S] {
    #[inline]
    fn has_entry(&self, i: usize) -> bool {
        i < self.len()
    }

    #[inline]
    fn read_entry<const N: usize>(&self, i: usize, dst: &mut String<N>) {
        match self.get(i) {
            Some(e) => dst.copy_truncated(e.as_ref()),
            None => dst.reset(),
        }
    }
}

impl<S: AsRef<[u8]>> ExecVector for Vec<S> {
    #[inline]
    fn has_entry(&self, i: usize) -> bool {
        self.as_slice().has_entry(i)
    }

    #[inline]
    fn read_entry<const N: usize>(&self, i: usize, dst: &mut String<N>) {
        self.as_slice().read_entry(i, dst)
    }
}

/// Directory chain built out of a path. Node `0` is the top of the
/// filesystem and node `n` is the directory named by the `n`th
/// component of the path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PathChain {
    components: Vec<Vec<u8>>,
    root: Option<usize>,
}

impl PathChain {
    /// Chain of an absolute path, the task root being `/`
    pub fn new<P: AsRef<Path>>(cwd: P) -> Self {
        Self {
            components: Self::split(cwd.as_ref()),
            root: Some(0),
        }
    }

    /// Chain of `cwd` for a task whose root directory is `root`. When
    /// `cwd` is not below `root` the walk goes up to the top of the
    /// filesystem.
    pub fn with_root<P: AsRef<Path>, R: AsRef<Path>>(cwd: P, root: R) -> Self {
        let components = Self::split(cwd.as_ref());
        let root = Self::split(root.as_ref());

        let root = components.starts_with(&root).then_some(root.len());

        Self { components, root }
    }

    fn split(p: &Path) -> Vec<Vec<u8>> {
        p.components()
            .filter_map(|c| match c {
                Component::Normal(n) => Some(n.as_bytes().to_vec()),
                _ => None,
            })
            .collect()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.components.len()
    }
}

impl DirChain for PathChain {
    type Node = usize;

    #[inline]
    fn pwd(&self) -> Self::Node {
        self.components.len()
    }

    #[inline]
    fn is_root(&self, node: Self::Node) -> bool {
        self.root == Some(node)
    }

    #[inline]
    fn parent(&self, node: Self::Node) -> Self::Node {
        node.saturating_sub(1)
    }

    #[inline]
    fn read_name<const N: usize>(&self, node: Self::Node, dst: &mut String<N>) {
        match node.checked_sub(1).and_then(|i| self.components.get(i)) {
            Some(name) => dst.copy_truncated(name),
            None => dst.reset(),
        }
    }
}

/// Snapshot of a task owning all its data
#[derive(Debug, Default, Clone)]
pub struct OwnedSnapshot {
    pub task_id: u64,
    pub timestamp_ns: u64,
    pub comm: Vec<u8>,
    pub filename: Vec<u8>,
    pub argv: Vec<Vec<u8>>,
    pub envp: Vec<Vec<u8>>,
    pub cwd: PathChain,
}

impl OwnedSnapshot {
    pub fn new(task_id: u64, timestamp_ns: u64) -> Self {
        Self {
            task_id,
            timestamp_ns,
            ..Default::default()
        }
    }

    pub fn comm<S: AsRef<[u8]>>(mut self, comm: S) -> Self {
        self.comm = comm.as_ref().to_vec();
        self
    }

    pub fn filename<S: AsRef<[u8]>>(mut self, filename: S) -> Self {
        self.filename = filename.as_ref().to_vec();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.argv = args.into_iter().map(|a| a.as_ref().to_vec()).collect();
        self
    }

    pub fn envs<I, S>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.envp = envs.into_iter().map(|e| e.as_ref().to_vec()).collect();
        self
    }

    pub fn cwd(mut self, cwd: PathChain) -> Self {
        self.cwd = cwd;
        self
    }
}

impl ExecSnapshot for OwnedSnapshot {
    type Args = Vec<Vec<u8>>;
    type Envs = Vec<Vec<u8>>;
    type Cwd = PathChain;

    #[inline]
    fn task_id(&self) -> u64 {
        self.task_id
    }

    #[inline]
    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    #[inline]
    fn read_comm<const N: usize>(&self, dst: &mut String<N>) {
        dst.copy_truncated(&self.comm)
    }

    #[inline]
    fn read_filename<const N: usize>(&self, dst: &mut String<N>) {
        dst.copy_truncated(&self.filename)
    }

    #[inline]
    fn argv(&self) -> &Self::Args {
        &self.argv
    }

    #[inline]
    fn envp(&self) -> &Self::Envs {
        &self.envp
    }

    #[inline]
    fn cwd(&self) -> &Self::Cwd {
        &self.cwd
    }
}
