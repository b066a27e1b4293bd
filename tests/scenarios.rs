use std::collections::BTreeMap;
use std::sync::Arc;

use pwd_risk::corpus::append_segment;
use pwd_risk::pipeline::{
    BANNED_WORDS_DETECTION, CRACK_TIME_ESTIMATION, LEAKED_PASSWORD_DETECTION, PII_DETECTION,
};
use pwd_risk::{
    analyze_variants, build_term_set, match_against_password, normalize, obfuscate,
    AnalysisRequest, ConfigHandle, LayerStatus, LookupBudget, MembershipIndex, Pipeline,
    PipelineConfig, ShardBuilder,
};
use secrecy::SecretString;
use tempfile::{tempdir, TempDir};

struct Fixture {
    shards: TempDir,
    corpus: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let shards = tempdir().expect("Failed to create shard dir");
        let mut builder = ShardBuilder::new();
        builder.extend(["password", "dragon", "letmein"]);
        builder.write(shards.path()).expect("Failed to write shards");

        let corpus = tempdir().expect("Failed to create corpus dir");
        append_segment(corpus.path(), ["acmecorp"]).expect("Failed to append segment");

        Self { shards, corpus }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::from_config(Arc::new(PipelineConfig {
            shard_dir: self.shards.path().to_path_buf(),
            corpus_dir: self.corpus.path().to_path_buf(),
            ..PipelineConfig::default()
        }))
    }
}

fn request(pwd: &str) -> AnalysisRequest {
    AnalysisRequest::new(SecretString::new(pwd.to_string().into()))
}

#[tokio::test]
async fn leet_password_is_found_in_breach_shards() {
    let fixture = Fixture::new();
    let report = fixture.pipeline().analyze(&request("p4ssw0rd")).await.unwrap();

    let breach = report.layer(LEAKED_PASSWORD_DETECTION).unwrap();
    assert_eq!(breach.status, LayerStatus::Flagged);
    assert_eq!(breach.evidence["matched_variant"], "password");
    assert_eq!(
        report.layer(CRACK_TIME_ESTIMATION).unwrap().status,
        LayerStatus::Flagged
    );
    assert!(report.flagged);
}

#[tokio::test]
async fn corpus_term_flags_banned_layer() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    assert!(pipeline.corpus().contains("acmecorp"));

    let report = pipeline.analyze(&request("acmecorp")).await.unwrap();
    assert_eq!(
        report.layer(BANNED_WORDS_DETECTION).unwrap().status,
        LayerStatus::Flagged
    );
}

#[tokio::test]
async fn identity_fields_leak_into_password() {
    let fixture = Fixture::new();
    let identity = BTreeMap::from([
        ("Birthday".to_string(), "05-12-1998".to_string()),
        ("City".to_string(), "New York".to_string()),
    ]);

    let report = fixture
        .pipeline()
        .analyze(&request("Zq!19980512").with_identity(identity))
        .await
        .unwrap();

    let pii = report.layer(PII_DETECTION).unwrap();
    assert_eq!(pii.status, LayerStatus::Flagged);
    let matched: Vec<&str> = pii.evidence["matched_terms"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t.as_str())
        .collect();
    assert!(matched.contains(&"19980512"));
    assert!(!matched.contains(&"ny"));
}

#[test]
fn birthday_expands_to_reorderings() {
    let terms = build_term_set([("Birthday", "05-12-1998")]);
    for expected in ["05", "12", "1998", "05121998", "19980512", "12051998"] {
        assert!(terms.contains(expected), "missing {expected}");
    }
}

#[test]
fn normalized_name_matches_leet_password() {
    let terms = build_term_set([("GivenName", "Onkar")]);
    let matched = match_against_password("0nk4r123", &terms).unwrap();
    assert!(matched.contains("onkar"));
}

#[test]
fn custom_term_makes_normalized_variant_weaker() {
    let analysis = analyze_variants("Summ3r2024!", &["summer"]);
    assert!(analysis.normalized_is_weaker);
    assert!(analysis.weakest_normalized.score < analysis.original.score);
}

#[test]
fn variant_generation_properties() {
    let plain = normalize("xyzzy");
    assert_eq!(plain.iter().collect::<Vec<_>>(), ["xyzzy"]);

    for pwd in ["p4ssw0rd", "s3cr3t!", "hello"] {
        let variants: Vec<String> = obfuscate(pwd, 10).collect();
        assert_eq!(variants.first().map(String::as_str), Some(pwd));
        assert!(variants.len() <= 10);
    }

    let normalized = normalize("p4ssw0rd");
    assert!(normalized.contains("password"));
    for variant in normalized.iter().filter(|v| v.chars().all(char::is_alphabetic)) {
        assert!(normalize(variant).contains(variant));
    }
}

#[test]
fn membership_answers_without_shards() {
    let dir = tempdir().unwrap();
    let index = MembershipIndex::open(dir.path());
    let check = index.check_compromised("anything", &LookupBudget::default());
    assert!(!check.found);
    assert!(check.matched_variant.is_none());
}

#[test]
fn config_updates_do_not_touch_snapshots() {
    let handle = ConfigHandle::new(PipelineConfig::default()).unwrap();
    let before = handle.snapshot();

    let after = handle.update(|c| c.min_crack_seconds = 60.0).unwrap();

    assert_eq!(before.version, 1);
    assert_eq!(before.min_crack_seconds, 3600.0);
    assert_eq!(after.version, 2);
    assert_eq!(handle.snapshot().min_crack_seconds, 60.0);
}
