//! Migration chains
//!
//! A [`MigrationChain`] is the ordered list of version-gated transforms an
//! importer declares. Running it brings a table recorded at some older
//! version up to the importer's current schema.

use crate::error::MigrationError;
use crate::version::SchemaVersion;
use forge_table::ObjectTable;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// One transform of a migration chain
///
/// Implement this for asynchronous migrations; synchronous ones can be
/// declared with a closure through [`MigrationChain::step`].
#[async_trait::async_trait]
pub trait Migrate: Send + Sync {
    /// Rewrite `table` into the next schema
    async fn migrate(&self, table: &mut ObjectTable) -> anyhow::Result<()>;
}

struct FnMigrate<F>(F);

#[async_trait::async_trait]
impl<F> Migrate for FnMigrate<F>
where
    F: Fn(&mut ObjectTable) -> anyhow::Result<()> + Send + Sync,
{
    async fn migrate(&self, table: &mut ObjectTable) -> anyhow::Result<()> {
        (self.0)(table)
    }
}

#[derive(Clone)]
struct Step {
    version: SchemaVersion,
    migrate: Arc<dyn Migrate>,
}

impl Debug for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("version", &self.version).finish_non_exhaustive()
    }
}

/// Outcome of [`MigrationChain::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions of the steps that ran, ascending
    pub applied: Vec<SchemaVersion>,
    /// Version to record for the asset; `None` when nothing ran
    pub stamp: Option<SchemaVersion>,
}

impl MigrationReport {
    /// Did at least one step run?
    #[inline]
    #[must_use]
    pub fn migrated(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Ascending, strictly monotonic list of migration steps
#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    steps: Vec<Step>,
}

impl MigrationChain {
    /// Empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a synchronous step
    ///
    /// # Errors
    /// Returns error if `version` does not parse or is not above the last step
    pub fn step<F>(self, version: &str, migrate: F) -> Result<Self, MigrationError>
    where
        F: Fn(&mut ObjectTable) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.step_async(version, FnMigrate(migrate))
    }

    /// Append an asynchronous step
    ///
    /// # Errors
    /// Returns error if `version` does not parse or is not above the last step
    pub fn step_async(
        mut self,
        version: &str,
        migrate: impl Migrate + 'static,
    ) -> Result<Self, MigrationError> {
        self.push(version.parse()?, Arc::new(migrate))?;
        Ok(self)
    }

    /// Append a step in place
    ///
    /// # Errors
    /// Returns [`MigrationError::NotAscending`] if `version` is not above the last step
    pub fn push(
        &mut self,
        version: SchemaVersion,
        migrate: Arc<dyn Migrate>,
    ) -> Result<(), MigrationError> {
        if let Some(previous) = self.latest() {
            if version <= *previous {
                return Err(MigrationError::NotAscending {
                    previous: previous.clone(),
                    version,
                });
            }
        }
        self.steps.push(Step { version, migrate });
        Ok(())
    }

    /// Declared versions, ascending
    pub fn versions(&self) -> impl Iterator<Item = &SchemaVersion> {
        self.steps.iter().map(|s| &s.version)
    }

    /// Version of the last step
    #[must_use]
    pub fn latest(&self) -> Option<&SchemaVersion> {
        self.steps.last().map(|s| &s.version)
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// No steps declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Versions of the steps [`run`](Self::run) would apply
    ///
    /// Nothing is pending for an asset that was never imported.
    #[must_use]
    pub fn pending(&self, recorded: Option<&SchemaVersion>) -> Vec<&SchemaVersion> {
        let Some(recorded) = recorded else {
            return Vec::new();
        };
        self.versions().filter(|v| *v > recorded).collect()
    }

    /// Apply every step newer than `recorded`, in ascending order
    ///
    /// Each step completes before the next begins. The table is left as the
    /// failing step left it on error; callers discard it rather than commit.
    ///
    /// # Errors
    /// - [`MigrationError::ImporterBehindChain`] if `current` is older than the last step
    /// - [`MigrationError::StepFailed`] if a step fails
    pub async fn run(
        &self,
        table: &mut ObjectTable,
        recorded: Option<&SchemaVersion>,
        current: &SchemaVersion,
    ) -> Result<MigrationReport, MigrationError> {
        if let Some(latest) = self.latest() {
            if current < latest {
                return Err(MigrationError::ImporterBehindChain {
                    current: current.clone(),
                    latest: latest.clone(),
                });
            }
        }

        let Some(recorded) = recorded else {
            tracing::debug!("no recorded version; skipping {} migrations", self.len());
            return Ok(MigrationReport::default());
        };

        let mut report = MigrationReport::default();
        for step in self.steps.iter().filter(|s| s.version > *recorded) {
            tracing::debug!(version = %step.version, "applying migration");
            if let Err(source) = step.migrate.migrate(table).await {
                tracing::error!(version = %step.version, error = %source, "migration failed");
                return Err(MigrationError::StepFailed {
                    version: step.version.clone(),
                    source,
                });
            }
            report.applied.push(step.version.clone());
        }

        if report.migrated() {
            report.stamp = Some(current.clone());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_table::{Opaque, Record};

    fn v(s: &str) -> SchemaVersion {
        s.parse().unwrap()
    }

    fn marking(tag: &'static str) -> impl Fn(&mut ObjectTable) -> anyhow::Result<()> {
        move |table| {
            forge_table::rewrite::append_record(
                table,
                Record::Opaque(Opaque {
                    tag: Some(tag.to_string()),
                    fields: forge_table::Fields::new(),
                }),
            );
            Ok(())
        }
    }

    fn tags(table: &ObjectTable) -> Vec<String> {
        table.records().iter().map(|r| r.tag().to_string()).collect()
    }

    fn chain() -> MigrationChain {
        MigrationChain::new()
            .step("1.0.1", marking("a"))
            .unwrap()
            .step("1.0.9", marking("b"))
            .unwrap()
            .step("1.0.10", marking("c"))
            .unwrap()
    }

    #[test]
    fn rejects_non_ascending_steps() {
        let err = chain().step("1.0.10", marking("d")).unwrap_err();
        assert!(matches!(err, MigrationError::NotAscending { .. }));
        assert!(matches!(
            MigrationChain::new().step("x", marking("d")),
            Err(MigrationError::Version(_))
        ));
    }

    #[tokio::test]
    async fn runs_only_newer_steps_in_order() {
        let mut table = ObjectTable::new();
        let report = chain()
            .run(&mut table, Some(&v("1.0.2")), &v("1.1.0"))
            .await
            .unwrap();
        assert_eq!(report.applied, vec![v("1.0.9"), v("1.0.10")]);
        assert_eq!(report.stamp, Some(v("1.1.0")));
        assert_eq!(tags(&table), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn fresh_asset_skips_everything() {
        let mut table = ObjectTable::new();
        let report = chain().run(&mut table, None, &v("1.1.0")).await.unwrap();
        assert!(!report.migrated());
        assert_eq!(report.stamp, None);
        assert!(table.is_empty());
        assert!(chain().pending(None).is_empty());
    }

    #[tokio::test]
    async fn importer_behind_chain_is_rejected() {
        let mut table = ObjectTable::new();
        let err = chain()
            .run(&mut table, Some(&v("1.0.0")), &v("1.0.5"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::ImporterBehindChain { .. }));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn failing_step_stops_the_chain() {
        let chain = MigrationChain::new()
            .step("1.0.1", marking("a"))
            .unwrap()
            .step("1.0.2", |_: &mut ObjectTable| anyhow::bail!("bad shape"))
            .unwrap()
            .step("1.0.3", marking("c"))
            .unwrap();
        let mut table = ObjectTable::new();
        let err = chain
            .run(&mut table, Some(&v("1.0.0")), &v("1.0.3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::StepFailed { ref version, .. } if *version == v("1.0.2")));
        assert!(err.is_asset_fatal());
        assert_eq!(tags(&table), vec!["a"]);
    }
}
