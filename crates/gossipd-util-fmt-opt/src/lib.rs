// SPDX-License-Identifier: MIT

//! `Display` helper for `Option<T>`, used in `tracing` fields so a missing
//! value renders as `none` instead of forcing callers to `match` everywhere.

use std::fmt;

pub struct FmtOption<'o, T>(pub &'o Option<T>);

impl<T> fmt::Display for FmtOption<'_, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(t) => t.fmt(f),
            None => f.write_str("none"),
        }
    }
}

pub trait AsFmtOption<T> {
    fn fmt_option(&self) -> FmtOption<'_, T>;
}

impl<T> AsFmtOption<T> for Option<T> {
    fn fmt_option(&self) -> FmtOption<'_, T> {
        FmtOption(self)
    }
}
