// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Testing helper macros.

/// Assert that an expression matches a pattern.
///
/// # Example
///
/// ```
/// use terrapin_macros::assert_matches;
///
/// #[derive(Debug)]
/// enum Outcome { Ok(i32), Err(String) }
///
/// let result = Outcome::Ok(42);
/// assert_matches!(result, Outcome::Ok(n) if n > 0);
/// ```
#[macro_export]
macro_rules! assert_matches {
    ($expr:expr, $pat:pat) => {
        match $expr {
            $pat => {}
            ref e => panic!(
                "assertion failed: `{}` does not match pattern `{}`\n  value: {:?}",
                stringify!($expr),
                stringify!($pat),
                e
            ),
        }
    };
    ($expr:expr, $pat:pat if $guard:expr) => {
        match $expr {
            $pat if $guard => {}
            ref e => panic!(
                "assertion failed: `{}` does not match pattern `{} if {}`\n  value: {:?}",
                stringify!($expr),
                stringify!($pat),
                stringify!($guard),
                e
            ),
        }
    };
}

/// Assert that a `Result` is an error whose `Display` output contains `needle`.
///
/// Evaluates to the error value so the caller can inspect it further.
///
/// # Example
///
/// ```
/// use terrapin_macros::assert_err_contains;
///
/// let result: Result<(), String> = Err("undeclared variable 'x'".into());
/// let err = assert_err_contains!(result, "undeclared");
/// assert!(err.ends_with("'x'"));
/// ```
#[macro_export]
macro_rules! assert_err_contains {
    ($result:expr, $needle:expr) => {
        match $result {
            Ok(ref v) => panic!(
                "assertion failed: `{}` is Ok({:?}), expected an error containing {:?}",
                stringify!($result),
                v,
                $needle
            ),
            Err(e) => {
                let message = e.to_string();
                assert!(
                    message.contains($needle),
                    "error `{}` does not contain {:?}",
                    message,
                    $needle
                );
                e
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_matches_with_guard() {
        let value = Some(3);
        assert_matches!(value, Some(n) if n == 3);
    }

    #[test]
    #[should_panic(expected = "does not match pattern")]
    fn test_assert_matches_failure() {
        let value: Option<i32> = None;
        assert_matches!(value, Some(_));
    }

    #[test]
    fn test_assert_err_contains() {
        let result: Result<i32, String> = Err("type mismatch".to_string());
        let err = assert_err_contains!(result, "mismatch");
        assert_eq!(err, "type mismatch");
    }
}
