use exectrace_macros::StrEnum;

/// Bit positions of the partial failure flags carried by a [`BasicRecord`](crate::records::BasicRecord)
#[repr(u32)]
#[derive(StrEnum, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Flag {
    #[str("fail_arg")]
    FailArg = 0,
    #[str("fail_env")]
    FailEnv = 1,
    #[str("fail_path")]
    FailPath = 2,
    #[str("incomplete_args")]
    IncompleteArgs = 3,
    #[str("incomplete_envs")]
    IncompleteEnvs = 4,
}

impl Flag {
    #[inline(always)]
    pub const fn bit(&self) -> u32 {
        *self as u32
    }

    #[inline(always)]
    pub const fn mask(&self) -> u32 {
        1 << self.bit()
    }

    /// Whether the flag marks a stage that aborted the session
    #[inline(always)]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Flag::FailArg | Flag::FailEnv | Flag::FailPath)
    }
}

/// Sets `bit` in `flags` and returns the result
#[inline(always)]
pub const fn set(flags: u32, bit: u32) -> u32 {
    flags | (1 << bit)
}

#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    #[inline(always)]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline(always)]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn set(&mut self, flag: Flag) {
        self.0 = set(self.0, flag.bit())
    }

    #[inline(always)]
    pub const fn with(self, flag: Flag) -> Self {
        Self(set(self.0, flag.bit()))
    }

    #[inline(always)]
    pub const fn contains(&self, flag: Flag) -> bool {
        crate::test_flag!(self.0, flag.mask())
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the failure flag set, if any
    pub fn failure(&self) -> Option<Flag> {
        Flag::variants()
            .into_iter()
            .find(|f| f.is_failure() && self.contains(*f))
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::variants().into_iter().filter(|f| self.contains(*f))
    }
}

impl From<Flags> for u32 {
    fn from(value: Flags) -> Self {
        value.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set() {
        assert_eq!(set(0, 0), 1);
        assert_eq!(set(1, 3), 0b1001);
        // setting an already set bit is idempotent
        assert_eq!(set(0b1001, 3), 0b1001);
    }

    #[test]
    fn test_flags_accumulate() {
        let mut f = Flags::empty();
        assert!(f.is_empty());

        f.set(Flag::IncompleteArgs);
        f.set(Flag::IncompleteEnvs);
        assert!(f.contains(Flag::IncompleteArgs));
        assert!(f.contains(Flag::IncompleteEnvs));
        assert_eq!(f.failure(), None);

        f.set(Flag::FailPath);
        assert_eq!(f.bits(), 0b11100);
        assert_eq!(f.failure(), Some(Flag::FailPath));
        assert_eq!(
            f.iter().collect::<Vec<_>>(),
            vec![Flag::FailPath, Flag::IncompleteArgs, Flag::IncompleteEnvs]
        );
    }

    #[test]
    fn test_flag_names() {
        assert_eq!(Flag::FailArg.as_str(), "fail_arg");
        assert_eq!(Flag::try_from_uint(4u32), Ok(Flag::IncompleteEnvs));
        assert_eq!(Flags::empty().with(Flag::FailEnv).bits(), 0b10);
    }
}
