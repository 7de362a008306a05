use std::collections::BTreeMap;

use hpcdb_formats::profiledb::{IdentifierFlags, ProfileFlags};
use hpcdb_formats::tracedb::{TimestampRange, TraceElement};
use hpcdb_formats::{ContextDb, ErrorCategory, FormatErrorKind, ProfileDb, TraceDb};
use hpcdb_testutils::{
    build_cct, build_profile, build_trace, patch_u64, sample_cct, sample_profiles,
    sample_traces, ProfileSpec, TraceSpec, SAMPLE_TIMESTAMPS,
};

use similar_asserts::assert_eq;

type Error = Box<dyn std::error::Error>;

#[test]
fn test_profiles() -> Result<(), Error> {
    let (image, _) = build_profile(0, &sample_profiles());
    assert!(ProfileDb::test(&image));

    let db = ProfileDb::parse(&image)?;
    assert_eq!(db.minor_version(), 0);
    assert_eq!(db.profiles().len(), 3);

    let summary = db.summary().unwrap();
    assert!(summary.is_summary());
    assert!(summary.flags.contains(ProfileFlags::IS_SUMMARY));
    assert_eq!(summary.id_tuple, None);
    assert_eq!(summary.values.len(), 3);

    let thread = db.profile(2).unwrap();
    assert!(!thread.is_summary());
    let ids = thread.id_tuple.as_ref().unwrap();
    let kinds: Vec<_> = ids.iter().map(|id| id.kind).collect();
    assert_eq!(kinds, [1, 2, 3]);
    assert_eq!(ids[1].logical_id, 1);
    assert!(ids[2].flags.contains(IdentifierFlags::IS_PHYSICAL));
    assert_eq!(ids[2].physical_id, 13);

    let expected = BTreeMap::from([(1, 40.0), (2, 150.0)]);
    assert_eq!(thread.context_values(2), Some(&expected));
    assert_eq!(thread.context_values(3), None);
    assert!(db.profile(3).is_none());

    Ok(())
}

#[test]
fn test_profile_without_summary() -> Result<(), Error> {
    let profiles: Vec<_> = sample_profiles().into_iter().skip(1).collect();
    let (image, _) = build_profile(0, &profiles);

    let db = ProfileDb::parse(&image)?;
    assert_eq!(db.profiles().len(), 2);
    assert!(db.summary().is_none());

    Ok(())
}

#[test]
fn test_empty_profile() -> Result<(), Error> {
    let profiles = [ProfileSpec {
        id_tuple: Some(Vec::new()),
        ..Default::default()
    }];
    let (image, _) = build_profile(0, &profiles);

    let db = ProfileDb::parse(&image)?;
    let profile = db.profile(0).unwrap();
    assert_eq!(profile.id_tuple, Some(Vec::new()));
    assert!(profile.values.is_empty());

    Ok(())
}

#[test]
fn test_profile_duplicate_context() {
    let profiles = [ProfileSpec {
        id_tuple: Some(Vec::new()),
        flags: 0,
        values: vec![(2, vec![(1, 1.0)]), (2, vec![(1, 2.0)])],
    }];
    let (image, _) = build_profile(0, &profiles);

    let err = ProfileDb::parse(&image).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvariantViolation);
}

#[test]
fn test_profile_values_out_of_bounds() {
    let (mut image, offsets) = build_profile(0, &sample_profiles());
    let len = image.len() as u64;
    // pValues of the first profile.
    patch_u64(&mut image, offsets[0] + 0x08, len - 4);

    let err = ProfileDb::parse(&image).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TruncatedStructure);
}

#[test]
fn test_contexts() -> Result<(), Error> {
    let image = build_cct(0, &sample_cct());
    assert!(ContextDb::test(&image));

    let db = ContextDb::parse(&image)?;
    assert_eq!(db.len(), 8);
    assert!(!db.is_empty());

    let ids: Vec<_> = db.iter().map(|(ctx_id, _)| ctx_id).collect();
    assert_eq!(ids, [2, 6]);

    let values = db.values(2).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[&2], BTreeMap::from([(1, 250.0), (2, 150.0)]));
    assert!(db.values(3).unwrap().is_empty());
    assert_eq!(db.values(8), None);

    Ok(())
}

#[test]
fn test_contexts_duplicate_profile() {
    let contexts = vec![Vec::new(), vec![(0, vec![(1, 1.0), (1, 2.0)])]];
    let image = build_cct(0, &contexts);

    let err = ContextDb::parse(&image).unwrap_err();
    assert_eq!(
        err.kind(),
        FormatErrorKind::InvariantViolation("duplicate key in value block")
    );
}

#[test]
fn test_traces() -> Result<(), Error> {
    let (image, _) = build_trace(0, SAMPLE_TIMESTAMPS, &sample_traces());
    assert!(TraceDb::test(&image));

    let db = TraceDb::parse(&image)?;
    assert_eq!(db.minor_version(), 0);
    assert_eq!(
        db.timestamp_range(),
        TimestampRange {
            min: 1000,
            max: 1600
        }
    );

    let traces = db.traces();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].prof_index, 1);
    assert_eq!(
        traces[0].line(),
        [
            TraceElement {
                timestamp: 1000,
                ctx_id: 2
            },
            TraceElement {
                timestamp: 1200,
                ctx_id: 4
            },
            TraceElement {
                timestamp: 1400,
                ctx_id: 6
            },
        ]
    );
    assert_eq!(traces[1].line().len(), 2);

    Ok(())
}

#[test]
fn test_empty_trace() -> Result<(), Error> {
    let traces = [TraceSpec {
        prof_index: 1,
        line: Vec::new(),
    }];
    let (image, _) = build_trace(0, (0, 0), &traces);

    let db = TraceDb::parse(&image)?;
    assert!(db.traces()[0].line().is_empty());

    Ok(())
}

#[test]
fn test_trace_partial_element() {
    let (mut image, offsets) = build_trace(0, SAMPLE_TIMESTAMPS, &sample_traces());
    let start = u64::from_le_bytes(image[offsets[0] as usize + 8..][..8].try_into().unwrap());
    patch_u64(&mut image, offsets[0] + 0x10, start + 5);

    let err = TraceDb::parse(&image).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvariantViolation);
}

#[test]
fn test_trace_ends_before_start() {
    let (mut image, offsets) = build_trace(0, SAMPLE_TIMESTAMPS, &sample_traces());
    patch_u64(&mut image, offsets[1] + 0x10, 0);

    let err = TraceDb::parse(&image).unwrap_err();
    assert_eq!(
        err.kind(),
        FormatErrorKind::InvariantViolation("trace ends before it starts")
    );
}

#[test]
fn test_trace_timestamps_decrease() {
    let traces = [TraceSpec {
        prof_index: 1,
        line: vec![(1400, 2), (1000, 4), (1200, 6)],
    }];
    let (image, _) = build_trace(0, (1000, 1400), &traces);

    let err = TraceDb::parse(&image).unwrap_err();
    assert_eq!(
        err.kind(),
        FormatErrorKind::InvariantViolation("trace timestamps decrease")
    );
}

#[test]
fn test_trace_repeated_timestamp() -> Result<(), Error> {
    let traces = [TraceSpec {
        prof_index: 1,
        line: vec![(1000, 2), (1000, 4), (1200, 6)],
    }];
    let (image, _) = build_trace(0, (1000, 1200), &traces);

    let db = TraceDb::parse(&image)?;
    assert_eq!(db.traces()[0].line().len(), 3);

    Ok(())
}

#[test]
fn test_trace_past_end_of_file() {
    let (mut image, offsets) = build_trace(0, SAMPLE_TIMESTAMPS, &sample_traces());
    let len = image.len() as u64;
    patch_u64(&mut image, offsets[1] + 0x08, len);
    patch_u64(&mut image, offsets[1] + 0x10, len + 24);

    let err = TraceDb::parse(&image).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TruncatedStructure);
}

#[test]
fn test_newer_minor_versions() -> Result<(), Error> {
    let (profile, _) = build_profile(2, &sample_profiles());
    assert_eq!(ProfileDb::parse(&profile)?.minor_version(), 2);

    let cct = build_cct(1, &sample_cct());
    assert_eq!(ContextDb::parse(&cct)?.minor_version(), 1);

    let (trace, _) = build_trace(7, SAMPLE_TIMESTAMPS, &sample_traces());
    assert_eq!(TraceDb::parse(&trace)?.traces().len(), 2);

    Ok(())
}
