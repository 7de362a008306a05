use std::fs;

use hpcdb_formats::database::TRACE_DB;
use hpcdb_formats::metadb::ContextRef;
use hpcdb_formats::{
    ContextDb, Database, ErrorCategory, FormatErrorKind, MetaDb, ProfileDb, TraceDb,
};
use hpcdb_testutils::{
    build_cct, build_meta, build_profile, build_trace, sample_cct, sample_meta, sample_profiles,
    sample_traces, write_sample_database, CtxValuesSpec, ProfileSpec, TraceSpec,
    SAMPLE_TIMESTAMPS,
};

use similar_asserts::assert_eq;

type Error = Box<dyn std::error::Error>;

struct Parts {
    meta: MetaDb,
    profiles: ProfileDb,
    contexts: ContextDb,
    traces: TraceDb,
}

fn parts(profiles: &[ProfileSpec], cct: &[CtxValuesSpec], traces: &[TraceSpec]) -> Parts {
    let (meta, _) = build_meta(&sample_meta());
    let (profile, _) = build_profile(0, profiles);
    let cct = build_cct(0, cct);
    let (trace, _) = build_trace(0, SAMPLE_TIMESTAMPS, traces);

    Parts {
        meta: MetaDb::parse(&meta).unwrap(),
        profiles: ProfileDb::parse(&profile).unwrap(),
        contexts: ContextDb::parse(&cct).unwrap(),
        traces: TraceDb::parse(&trace).unwrap(),
    }
}

fn combine(parts: Parts) -> Result<Database, hpcdb_formats::FormatError> {
    Database::from_parts(parts.meta, parts.profiles, parts.contexts, Some(parts.traces))
}

#[test]
fn test_open() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    write_sample_database(dir.path(), true)?;

    let db = Database::open(dir.path())?;
    assert_eq!(db.meta().general().title, "app");
    assert_eq!(db.profiles().profiles().len(), 3);
    assert_eq!(db.contexts().iter().count(), 2);
    assert_eq!(db.traces().map(|t| t.traces().len()), Some(2));

    // Follow a trace sample to its context and the values recorded there.
    let trace = &db.traces().unwrap().traces()[0];
    let sample = trace.line()[2];
    let Some(ContextRef::Context(context)) = db.meta().context_by_id(sample.ctx_id) else {
        panic!("trace refers to a missing context");
    };
    let function = db.meta().function(context.function.unwrap()).unwrap();
    assert_eq!(function.name, "solve");

    let profile = db.profiles().profile(trace.prof_index).unwrap();
    let values = profile.context_values(sample.ctx_id).unwrap();
    let (metric, instance) = db.meta().prop_metric(0).unwrap();
    assert_eq!(metric.name, "cycles");
    assert_eq!(values[&instance.prop_metric_id], 60.0);

    Ok(())
}

#[test]
fn test_open_twice() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    write_sample_database(dir.path(), true)?;

    assert_eq!(Database::open(dir.path())?, Database::open(dir.path())?);
    Ok(())
}

#[test]
fn test_open_without_trace() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    write_sample_database(dir.path(), false)?;

    let db = Database::open(dir.path())?;
    assert!(db.traces().is_none());
    assert_eq!(db.profiles().profiles().len(), 3);

    Ok(())
}

#[test]
fn test_open_missing_file() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;

    let err = Database::open(dir.path()).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::Io);
    assert_eq!(err.category(), ErrorCategory::MalformedContainer);
    assert!(std::error::Error::source(&err).is_some());

    Ok(())
}

#[test]
fn test_open_corrupt_trace() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    write_sample_database(dir.path(), false)?;
    fs::write(dir.path().join(TRACE_DB), b"HPCTOOLKITtrce")?;

    let err = Database::open(dir.path()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TruncatedStructure);

    Ok(())
}

#[test]
fn test_from_parts() -> Result<(), Error> {
    let db = combine(parts(&sample_profiles(), &sample_cct(), &sample_traces()))?;
    assert!(db.traces().is_some());
    Ok(())
}

#[test]
fn test_profile_unknown_context() {
    let mut profiles = sample_profiles();
    profiles[1].values.push((42, vec![(0, 1.0)]));

    let err = combine(parts(&profiles, &sample_cct(), &sample_traces())).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownContextId(42));
    assert_eq!(err.category(), ErrorCategory::DanglingReference);
}

#[test]
fn test_profile_summary_id_in_thread() {
    let mut profiles = sample_profiles();
    // Id 3 only exists as a summary statistic.
    profiles[2].values.push((7, vec![(3, 1.0)]));

    let err = combine(parts(&profiles, &sample_cct(), &sample_traces())).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownMetricId(3));
}

#[test]
fn test_summary_unknown_statistic() {
    let mut profiles = sample_profiles();
    profiles[0].values.push((7, vec![(4, 1.0)]));

    let err = combine(parts(&profiles, &sample_cct(), &sample_traces())).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownMetricId(4));
}

#[test]
fn test_cct_unknown_profile() {
    let mut cct = sample_cct();
    cct[6].push((1, vec![(9, 1.0)]));

    let err = combine(parts(&sample_profiles(), &cct, &sample_traces())).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownProfileIndex(9));
}

#[test]
fn test_cct_unknown_context() {
    let mut cct = sample_cct();
    cct.resize(12, Vec::new());
    cct[11] = vec![(0, vec![(1, 1.0)])];

    let err = combine(parts(&sample_profiles(), &cct, &sample_traces())).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownContextId(11));
}

#[test]
fn test_trace_unknown_context() {
    let mut traces = sample_traces();
    traces[1].line.push((1700, 99));

    let err = combine(parts(&sample_profiles(), &sample_cct(), &traces)).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownContextId(99));
}

#[test]
fn test_trace_unknown_profile() {
    let mut traces = sample_traces();
    traces[0].prof_index = 3;

    let err = combine(parts(&sample_profiles(), &sample_cct(), &traces)).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::UnknownProfileIndex(3));
}
