//! Outcome of one lifecycle command.

use modstack_common::error::ModstackError;

/// Non-fatal problems collected while a command ran.
///
/// A command that returns a report succeeded; warnings make it degraded.
#[derive(Debug, Default)]
pub struct Report {
    /// Isolated failures: failing hooks, skipped services.
    pub warnings: Vec<String>,
    /// Modules excluded from the catalog during loading.
    pub invalid_modules: Vec<String>,
}

impl Report {
    /// Records a warning and logs it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Records an isolated error.
    pub fn record(&mut self, error: &ModstackError) {
        self.warn(error.to_string());
    }

    /// Returns whether the command completed with warnings.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Appends the warnings of `other`.
    pub fn absorb(&mut self, other: Self) {
        self.warnings.extend(other.warnings);
        for module in other.invalid_modules {
            if !self.invalid_modules.contains(&module) {
                self.invalid_modules.push(module);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_degrade() {
        let mut report = Report::default();
        assert!(!report.is_degraded());
        report.record(&ModstackError::HookFailure {
            module: "web".into(),
            hook: "enable.sh".into(),
            status: "exit code 1".into(),
            output: "boom".into(),
        });
        assert!(report.is_degraded());
        assert!(report.warnings[0].contains("enable.sh"));
    }

    #[test]
    fn invalid_modules_alone_do_not_degrade() {
        let mut report = Report::default();
        report.invalid_modules.push("broken".into());
        assert!(!report.is_degraded());

        let mut other = Report::default();
        other.invalid_modules.push("broken".into());
        other.warn("late warning");
        report.absorb(other);
        assert_eq!(report.invalid_modules.len(), 1);
        assert!(report.is_degraded());
    }
}
