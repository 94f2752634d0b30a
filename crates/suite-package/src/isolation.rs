//! Panic containment around package code.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run `f`, turning a panic into `Err(<panic message>)`.
///
/// Package handles are shared behind `Arc` and never observed again in a
/// half-updated state by this crate, so asserting unwind safety is sound.
pub(crate) fn contain_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_passes_through() {
        assert_eq!(contain_panic(|| 7), Ok(7));
    }

    #[test]
    #[allow(clippy::panic)]
    fn panic_message_is_captured() {
        let err = contain_panic(|| -> u8 { panic!("bad {}", 42) }).unwrap_err();
        assert_eq!(err, "bad 42");
        let err = contain_panic(|| -> u8 { panic!("static") }).unwrap_err();
        assert_eq!(err, "static");
    }
}
