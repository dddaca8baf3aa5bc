//! Integration tests for project registries: merging, flags, attachment and records.

mod common;

use beiwe_registry::{
    config::{CoveragePolicy, RegistryConfig},
    registry::{
        ConfigurationAssignment, Flag, PhoneOs, ProjectRegistry, UserRegistryBuilder,
        UserSelection,
    },
    time::HourBucket,
    RegistryError,
};
use common::*;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};
use test_log::test;

fn create<P: AsRef<Path>>(roots: &[P], assignment: ConfigurationAssignment) -> ProjectRegistry {
    ProjectRegistry::create(
        roots.iter(),
        UserSelection::All,
        assignment,
        RegistryConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_merge_order_does_not_matter() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let ab = create(&[&a, &b], ConfigurationAssignment::None);
    let ba = create(&[&b, &a], ConfigurationAssignment::None);
    assert_eq!(ab, ba);
    assert_eq!(ab.merge_conflicts(), ba.merge_conflicts());
}

#[test]
fn test_user_merge_is_commutative() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let config = RegistryConfig::default();
    let builder = UserRegistryBuilder::new(&config.scan);
    let from_a = builder.scan(a.join("u1")).unwrap();
    let from_b = builder.scan(b.join("u1")).unwrap();

    let mut ab = from_a.clone();
    ab.merge(from_b.clone()).unwrap();
    let mut ba = from_b.clone();
    ba.merge(from_a.clone()).unwrap();
    assert_eq!(ab, ba);

    assert_eq!(ab.sources, BTreeSet::from([a.join("u1"), b.join("u1")]));
    assert_eq!(ab.devices.len(), 2);
    assert_eq!(ab.devices, ba.devices);
    let answers = &ab.surveys["survey_answers"]["5873fe38644ad7557b168e45"];
    assert_eq!(answers, &ba.surveys["survey_answers"]["5873fe38644ad7557b168e45"]);
    assert_eq!(answers.file_count(), 1);
    assert_eq!(answers.byte_total(), 85);
    assert_eq!(ab.conflicts().count(), 2);

    // Merging the same observations again changes nothing.
    let mut again = ab.clone();
    again.merge(from_a).unwrap();
    assert_eq!(again, ab);
}

#[test]
fn test_conflicting_bucket_keeps_both_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let project = create(&[&a, &b], ConfigurationAssignment::None);

    let conflicts = project.merge_conflicts();
    assert_eq!(conflicts.len(), 2);
    let bucket: HourBucket = "2020-03-01 10_00_00".parse().unwrap();
    assert_eq!(conflicts[0].user_id, "u1");
    assert_eq!(conflicts[0].stream, "accelerometer");
    assert_eq!(conflicts[0].survey, None);
    assert_eq!(conflicts[0].bucket, bucket);
    assert_eq!(conflicts[0].sizes, BTreeSet::from([100, 150]));
    assert!(project.flags().is_flagged(Flag::MergeConflicts, "u1"));
    assert_eq!(conflicts[1].stream, "survey_answers");
    assert_eq!(
        conflicts[1].survey.as_deref(),
        Some("5873fe38644ad7557b168e45")
    );
    assert_eq!(conflicts[1].sizes, BTreeSet::from([40, 45]));

    let u1 = project.user("u1").unwrap();
    let accelerometer = &u1.passive["accelerometer"];
    assert_eq!(accelerometer.file_count(), 2);
    assert_eq!(accelerometer.buckets()[&bucket].paths.len(), 2);
    assert_eq!(u1.sources.len(), 2);
}

#[test]
fn test_structural_flags() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let project = create(&[&a, &b], ConfigurationAssignment::None);
    let flags = project.flags();

    assert!(flags.is_flagged(Flag::MultipleDevices, "u1"));
    assert!(flags.is_flagged(Flag::MultipleOs, "u1"));
    assert_eq!(project.user("u1").unwrap().phone_os(), PhoneOs::Multiple);
    assert!(flags.is_flagged(Flag::IrregularDirectories, "u2"));
    assert!(!flags.is_flagged(Flag::UnregisteredFiles, "u2"));
    assert_eq!(project.user("u2").unwrap().phone_os(), PhoneOs::Ios);
    assert!(!flags.contains(Flag::UnnamedObjects));

    // u2 is observed first.
    let names = project.user_names();
    assert_eq!(names["u2"], "Participant 1");
    assert_eq!(names["u1"], "Participant 2");
}

#[test]
fn test_bogus_stream_is_irregular_not_unregistered() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("raw");
    write_raw(&root, "u", "accelerometer", "2020-03-01 10_00_00.csv", 10);
    write_raw(&root, "u", "gps", "2020-03-01 10_00_00.csv", 10);
    write_raw(&root, "u", "bogus_stream", "whatever.bin", 10);
    let project = create(&[&root], ConfigurationAssignment::None);

    let user = project.user("u").unwrap();
    let populated: Vec<_> = user.passive.iter().filter(|(_, inv)| !inv.is_empty()).collect();
    assert_eq!(populated.len(), 2);
    assert_eq!(user.irregular_directories, BTreeSet::from(["bogus_stream".to_string()]));
    assert!(user.unregistered_files.is_empty());
    assert!(project.flags().is_flagged(Flag::NoIdentifiers, "u"));
    assert!(project.flags().is_flagged(Flag::UnknownOs, "u"));
}

#[test]
fn test_user_without_data() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("raw");
    write_identifiers(&root, "quiet", "2020-03-01 09_00_00.csv", "DEV-9", "Android");
    let project = create(&[&root], ConfigurationAssignment::None);
    assert!(project.flags().is_flagged(Flag::WithoutData, "quiet"));
    assert!(!project.flags().is_flagged(Flag::NoIdentifiers, "quiet"));
}

#[test]
fn test_update_configurations_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let config = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
    let mut project = create(&[&a, &b], ConfigurationAssignment::None);

    let assignment = ConfigurationAssignment::All(config.clone());
    project.update_configurations(assignment.clone()).unwrap();
    let once = project.clone();
    project.update_configurations(assignment).unwrap();
    assert_eq!(project, once);
    assert_eq!(project.studies().len(), 1);
    assert_eq!(project.configuration_path("u2"), Some(&config));

    // The attached study supplies duty cycles: accelerometer runs 600s of every 1200s.
    let coverage = project.user("u1").unwrap().passive["accelerometer"].coverage();
    assert!(coverage.is_some());
    assert_eq!(coverage.unwrap().expected, 3);
    assert_eq!(coverage.unwrap().observed, 2);
    // Disabled in the study.
    assert_eq!(project.user("u1").unwrap().passive["identifiers"].coverage(), None);
}

#[test]
fn test_rename_survives_reattachment() {
    let dir = tempfile::tempdir().unwrap();
    let (a, _) = create_split_roots(dir.path());
    let config = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
    let mut project = create(&[&a], ConfigurationAssignment::All(config.clone()));

    let renames = BTreeMap::from([("Survey 2".to_string(), "Sleep".to_string())]);
    project.update_names(&config, &renames).unwrap();
    assert_eq!(project.object_label("5873fe38644ad7557b168e45"), "Sleep");

    project
        .update_configurations(ConfigurationAssignment::PerUser(BTreeMap::from([(
            "u1".to_string(),
            config.clone(),
        )])))
        .unwrap();
    assert_eq!(project.object_label("5873fe38644ad7557b168e45"), "Sleep");

    let missing = project.update_names(&dir.path().join("absent.json"), &renames);
    assert!(matches!(missing, Err(RegistryError::NotFound(_))));
}

#[test]
fn test_colliding_default_names_fall_back_to_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let mood = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
    let other = write_document(dir.path(), "Weekly_surveys_and_settings.json", &other_study_document());
    let assignment = ConfigurationAssignment::PerUser(BTreeMap::from([
        ("u1".to_string(), mood),
        ("u2".to_string(), other),
    ]));
    let project = create(&[&a, &b], assignment);

    assert!(project.flags().is_flagged(Flag::UnnamedObjects, "u1"));
    assert!(project.flags().is_flagged(Flag::UnnamedObjects, "u2"));
    assert_eq!(
        project.object_label("5873fe38644ad7557b168e44"),
        "5873fe38644ad7557b168e44"
    );
    assert_eq!(
        project.object_label("60a1b2c3d4e5f60718293a4c"),
        "60a1b2c3d4e5f60718293a4c"
    );
}

#[test]
fn test_any_attached_policy_shares_duty_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let mood = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
    let assignment =
        ConfigurationAssignment::PerUser(BTreeMap::from([("u1".to_string(), mood)]));

    let strict = create(&[&a, &b], assignment.clone());
    assert_eq!(strict.user("u2").unwrap().passive["gps"].coverage(), None);

    let mut config = RegistryConfig::default();
    config.coverage.policy = CoveragePolicy::AnyAttached;
    let shared = ProjectRegistry::create([&a, &b], UserSelection::All, assignment, config).unwrap();
    assert!(shared.user("u2").unwrap().passive["gps"].coverage().is_some());
}

#[test]
fn test_export_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let config = write_document(dir.path(), "Mood_surveys_and_settings.json", &current_v1_document());
    let mut project = ProjectRegistry::create(
        [&a, &b],
        UserSelection::only(["u1", "u2", "u9"]),
        ConfigurationAssignment::All(config.clone()),
        RegistryConfig::default(),
    )
    .unwrap();
    let renames = BTreeMap::from([("Survey 1".to_string(), "Voice Diary".to_string())]);
    project.update_names(&config, &renames).unwrap();

    let record = project.export("Mood Project", dir.path().join("out")).unwrap();
    assert!(record.ends_with("Mood_Project"));
    assert!(record.join("project.json").exists());
    assert!(record.join("registries").join("u1.json").exists());
    assert!(record.join("users").join("u2.txt").exists());
    assert!(record.join("summary.txt").exists());
    let overview = std::fs::read_to_string(record.join("overview.csv")).unwrap();
    assert_eq!(overview.lines().count(), 3);
    assert!(overview.starts_with("user_id,user_name,"));
    let fingerprint = project.study_for("u1").unwrap().fingerprint();
    assert!(record.join("configurations").join(&fingerprint).is_dir());

    let loaded = ProjectRegistry::load(&record).unwrap();
    assert_eq!(loaded, project);
    assert!(loaded.flags().is_flagged(Flag::NoRegistry, "u9"));
    assert_eq!(loaded.object_label("5873fe38644ad7557b168e44"), "Voice Diary");
    assert_eq!(loaded.merge_conflicts(), project.merge_conflicts());
}

#[test]
fn test_abort_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = create_split_roots(dir.path());
    let result = ProjectRegistry::create_with_abort(
        [&a, &b],
        UserSelection::All,
        ConfigurationAssignment::None,
        RegistryConfig::default(),
        || true,
    );
    assert_eq!(result.unwrap_err(), RegistryError::OperationCancelled);
}
