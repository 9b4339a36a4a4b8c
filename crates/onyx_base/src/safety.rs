use std::fmt;

/// The safety of a scope or operation. The order matters: a call site may
/// only invoke a callee whose required safety is greater than or equal to
/// the site's own, so `Unsafe < Fragile < Threadsafe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Safety {
    Unsafe,
    Fragile,
    Threadsafe,
}

impl Safety {
    pub fn name(self) -> &'static str {
        match self {
            Safety::Unsafe => "unsafe",
            Safety::Fragile => "fragile",
            Safety::Threadsafe => "threadsafe",
        }
    }

    /// The bang-suffixed keyword spelling, e.g. `unsafe!`.
    pub fn bang(self) -> &'static str {
        match self {
            Safety::Unsafe => "unsafe!",
            Safety::Fragile => "fragile!",
            Safety::Threadsafe => "threadsafe!",
        }
    }
}

impl fmt::Display for Safety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a declaration lives relative to its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    Static,
    Instance,
    #[default]
    Undefined,
}

impl Storage {
    pub fn name(self) -> &'static str {
        match self {
            Storage::Static => "static",
            Storage::Instance => "instance",
            Storage::Undefined => "undefined",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_order_is_unsafe_to_threadsafe() {
        assert!(Safety::Unsafe < Safety::Fragile);
        assert!(Safety::Fragile < Safety::Threadsafe);
    }

    #[test]
    fn unsafe_site_may_call_anything() {
        for callee in [Safety::Unsafe, Safety::Fragile, Safety::Threadsafe] {
            assert!(Safety::Unsafe <= callee);
        }
    }

    #[test]
    fn threadsafe_site_may_not_call_unsafe() {
        assert!(Safety::Threadsafe > Safety::Unsafe);
    }

    #[test]
    fn bang_spelling() {
        assert_eq!(Safety::Fragile.bang(), "fragile!");
    }
}
