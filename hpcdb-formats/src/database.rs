//! A complete database directory.
//!
//! `hpcprof` writes one directory per measurement containing `meta.db`, `profile.db`, `cct.db`
//! and, if tracing was enabled, `trace.db`. The files refer to each other by numeric ids: context
//! ids and metric ids are defined in `meta.db`, profile indices in `profile.db`. [`Database`]
//! decodes all files and checks that every such id resolves.

use std::io;
use std::path::Path;

use hpcdb_common::ByteView;

use crate::cctdb::ContextDb;
use crate::error::{FormatError, FormatErrorKind};
use crate::metadb::MetaDb;
use crate::profiledb::ProfileDb;
use crate::tracedb::TraceDb;

/// The file name of the metadata database.
pub const META_DB: &str = "meta.db";
/// The file name of the profile-major value database.
pub const PROFILE_DB: &str = "profile.db";
/// The file name of the context-major value database.
pub const CCT_DB: &str = "cct.db";
/// The file name of the trace database.
pub const TRACE_DB: &str = "trace.db";

/// All files of a database directory, decoded and cross-checked.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Database {
    meta: MetaDb,
    profiles: ProfileDb,
    contexts: ContextDb,
    traces: Option<TraceDb>,
}

fn open_file(path: &Path) -> Result<ByteView, FormatError> {
    ByteView::open(path).map_err(|e| FormatError::new(FormatErrorKind::Io, e))
}

impl Database {
    /// Opens the database in the given directory.
    ///
    /// `trace.db` is optional, all other files must exist.
    #[tracing::instrument(level = "trace", name = "Database::open", skip_all)]
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, FormatError> {
        let dir = dir.as_ref();

        let meta = MetaDb::parse(&open_file(&dir.join(META_DB))?)?;
        let profiles = ProfileDb::parse(&open_file(&dir.join(PROFILE_DB))?)?;
        let contexts = ContextDb::parse(&open_file(&dir.join(CCT_DB))?)?;
        let traces = match ByteView::open(dir.join(TRACE_DB)) {
            Ok(view) => Some(TraceDb::parse(&view)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("database has no trace.db");
                None
            }
            Err(e) => return Err(FormatError::new(FormatErrorKind::Io, e)),
        };

        Self::from_parts(meta, profiles, contexts, traces)
    }

    /// Combines separately decoded files and checks their references against each other.
    pub fn from_parts(
        meta: MetaDb,
        profiles: ProfileDb,
        contexts: ContextDb,
        traces: Option<TraceDb>,
    ) -> Result<Self, FormatError> {
        let database = Database {
            meta,
            profiles,
            contexts,
            traces,
        };
        database.check_profiles()?;
        database.check_contexts()?;
        database.check_traces()?;
        Ok(database)
    }

    fn check_ctx_id(&self, ctx_id: u32) -> Result<(), FormatError> {
        if !self.meta.context().contains_id(ctx_id) {
            return Err(FormatErrorKind::UnknownContextId(ctx_id).into());
        }
        Ok(())
    }

    fn check_prof_index(&self, index: u32) -> Result<(), FormatError> {
        if self.profiles.profile(index).is_none() {
            return Err(FormatErrorKind::UnknownProfileIndex(index).into());
        }
        Ok(())
    }

    fn check_profiles(&self) -> Result<(), FormatError> {
        for profile in self.profiles.profiles() {
            let summary = profile.is_summary();
            for (&ctx_id, values) in &profile.values {
                self.check_ctx_id(ctx_id)?;
                for &metric_id in values.keys() {
                    let known = if summary {
                        self.meta.summary_metric(metric_id).is_some()
                    } else {
                        self.meta.prop_metric(metric_id).is_some()
                    };
                    if !known {
                        return Err(FormatErrorKind::UnknownMetricId(metric_id).into());
                    }
                }
            }
        }
        Ok(())
    }

    fn check_contexts(&self) -> Result<(), FormatError> {
        for (ctx_id, values) in self.contexts.iter() {
            self.check_ctx_id(ctx_id)?;
            for (&metric_id, by_profile) in values {
                if self.meta.prop_metric(metric_id).is_none() {
                    return Err(FormatErrorKind::UnknownMetricId(metric_id).into());
                }
                for &prof_index in by_profile.keys() {
                    self.check_prof_index(prof_index)?;
                }
            }
        }
        Ok(())
    }

    fn check_traces(&self) -> Result<(), FormatError> {
        let Some(traces) = &self.traces else {
            return Ok(());
        };

        for trace in traces.traces() {
            self.check_prof_index(trace.prof_index)?;
            for element in trace.line() {
                self.check_ctx_id(element.ctx_id)?;
            }
        }
        Ok(())
    }

    /// The decoded `meta.db`.
    pub fn meta(&self) -> &MetaDb {
        &self.meta
    }

    /// The decoded `profile.db`.
    pub fn profiles(&self) -> &ProfileDb {
        &self.profiles
    }

    /// The decoded `cct.db`.
    pub fn contexts(&self) -> &ContextDb {
        &self.contexts
    }

    /// The decoded `trace.db`, if the directory has one.
    pub fn traces(&self) -> Option<&TraceDb> {
        self.traces.as_ref()
    }
}
