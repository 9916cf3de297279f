use std::{error::Error, fmt};

use crate::ansi::{Color, WithFg};

/// Formats an error and its chain of sources for the terminal.
pub struct Report<E> {
    error: E,
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E> fmt::Debug for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", WithFg::new(Color::Red, &self.error))?;
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {}", WithFg::new(Color::Red, s))?;
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("inner"))]
    struct Inner;

    #[derive(Debug, Snafu)]
    #[snafu(display("outer"))]
    struct Outer {
        source: Inner,
    }

    #[test]
    fn test_report_walks_sources() {
        let report = Report::new(Outer { source: Inner }).to_string();
        assert!(report.starts_with("Error: \x1B[31;1mouter\x1B[0m\n"));
        assert!(report.contains("Caused by:\n"));
        assert!(report.contains("   0: \x1B[31;1minner\x1B[0m\n"));
    }

    #[test]
    fn test_report_without_source() {
        let report = Report::new(Inner).to_string();
        assert_eq!(report, "Error: \x1B[31;1minner\x1B[0m\n");
    }
}
