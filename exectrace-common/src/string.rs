use core::cmp::min;

/// Fixed capacity byte string. The last byte is always kept for a
/// terminating null byte so at most `N - 1` bytes of content are stored,
/// anything beyond is silently dropped.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct String<const N: usize> {
    s: [u8; N],
    len: usize,
}

impl<const N: usize> Default for String<N> {
    fn default() -> Self {
        String { s: [0; N], len: 0 }
    }
}

impl<const N: usize> PartialEq for String<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for String<N> {}

impl<const N: usize> String<N> {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub const fn cap(&self) -> usize {
        N
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub const fn is_full(&self) -> bool {
        N == 0 || self.len >= N - 1
    }

    #[inline(always)]
    pub fn push_byte(&mut self, b: u8) {
        if self.is_full() {
            return;
        }
        self.s[self.len] = b;
        self.len += 1;
    }

    /// Appends as many bytes of `src` as the remaining capacity allows
    #[inline(always)]
    pub fn push_bytes<U: AsRef<[u8]>>(&mut self, src: U) {
        let src = src.as_ref();
        if self.is_full() {
            return;
        }
        let n = min(src.len(), N - 1 - self.len);
        self.s[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
    }

    /// Replaces the content with a truncated copy of `src`. Copy stops at
    /// the first null byte found in `src`.
    #[inline(always)]
    pub fn copy_truncated<U: AsRef<[u8]>>(&mut self, src: U) {
        self.reset();
        let src = src.as_ref();
        let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
        self.push_bytes(&src[..end]);
    }

    /// Content bytes, up to the first null byte
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        // len may come from decoded bytes so we never trust it blindly
        let s = &self.s[..min(self.len, N)];
        let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
        &s[..end]
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.s.iter_mut().for_each(|b| *b = 0);
        self.len = 0;
    }
}

// Specific code to all other arch than BPF
crate::not_bpf_target_code! {
    use std::borrow::Cow;
    use std::fmt::Display;

    impl<const N: usize> From<&str> for String<N> {
        fn from(value: &str) -> Self {
            let mut out = Self::new();
            out.copy_truncated(value);
            out
        }
    }

    impl<const N: usize> From<String<N>> for std::string::String {
        fn from(value: String<N>) -> Self {
            value.to_string_lossy().into()
        }
    }

    impl<const N: usize> Display for String<N> {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{}", self.to_string_lossy())
        }
    }

    impl<const N: usize> String<N> {
        // truncation may have split a multi-byte code point
        pub fn to_string_lossy(&self) -> Cow<'_, str> {
            std::string::String::from_utf8_lossy(self.as_bytes())
        }
    }
}
