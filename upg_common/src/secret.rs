use std::fmt;

const REDACTED: &str = "[redacted]";

/// Wrapper for credentials that must never reach logs or debug dumps.
///
/// Both `Debug` and `Display` print a fixed placeholder regardless of the inner type, so a `Secret` embedded in a
/// config struct stays opaque even under `{:?}` or `{:#?}`. The value itself is only obtainable through
/// [`Secret::reveal`], which keeps accidental leaks greppable.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formatting_never_exposes_the_value() {
        let secret = Secret::new("hunter2".to_string());
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.to_string(), REDACTED);
        assert_eq!(format!("{secret:#?}"), REDACTED);
    }

    #[test]
    fn reveal_is_the_only_way_in() {
        let secret = Secret::new(42u64);
        assert_eq!(*secret.reveal(), 42);
        assert_eq!(secret.clone(), secret);
    }
}
