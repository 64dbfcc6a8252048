use crate::string::String;

crate::not_bpf_target_code! {
    mod user;
    pub use user::*;
}

/// Null terminated vector of strings as passed to execve (argv, envp)
pub trait ExecVector {
    /// Returns true if the vector holds an entry at index `i`, it must
    /// return false for every index past the terminator.
    fn has_entry(&self, i: usize) -> bool;

    /// Copies entry `i` into `dst`, truncating it to the capacity of
    /// `dst`. An unreadable entry leaves `dst` empty.
    fn read_entry<const N: usize>(&self, i: usize, dst: &mut String<N>);
}

/// Chain of directory nodes going from the working directory up to
/// the top of the filesystem.
pub trait DirChain {
    type Node: Copy + PartialEq;

    /// Working directory node
    fn pwd(&self) -> Self::Node;

    /// Returns true if `node` is the root directory of the task,
    /// which may be a chroot.
    fn is_root(&self, node: Self::Node) -> bool;

    /// Parent of `node`, the topmost node is its own parent
    fn parent(&self, node: Self::Node) -> Self::Node;

    fn read_name<const N: usize>(&self, node: Self::Node, dst: &mut String<N>);
}

/// Everything known about a task at the time it calls execve
pub trait ExecSnapshot {
    type Args: ExecVector;
    type Envs: ExecVector;
    type Cwd: DirChain;

    /// Thread group id in the upper 32 bits, thread id in the lower ones
    fn task_id(&self) -> u64;

    /// Monotonic timestamp of the event in nanoseconds
    fn timestamp_ns(&self) -> u64;

    fn read_comm<const N: usize>(&self, dst: &mut String<N>);

    fn read_filename<const N: usize>(&self, dst: &mut String<N>);

    fn argv(&self) -> &Self::Args;

    fn envp(&self) -> &Self::Envs;

    fn cwd(&self) -> &Self::Cwd;
}
