use modelpull::error::{PullError, Result};
use modelpull::models::{
    is_model_downloaded, ConfigResolver, Converter, ModelCatalog, ModelConfig, ModelSource,
    Publisher, Transport,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const CATALOG: &str = r#"{
    "org/snap": {
        "aliases": ["snap"],
        "distribution_channel": "HuggingFaceSnapshot",
        "distribution_path": "org/snap"
    },
    "m": {
        "distribution_channel": "DirectDownload",
        "distribution_path": ["https://x/a.bin", "https://x/b.bin"]
    },
    "broken": {
        "distribution_channel": "DirectDownload",
        "distribution_path": ["https://x/a.bin", "https://x/fail.bin"]
    },
    "gated": {
        "distribution_channel": "HuggingFaceSnapshot",
        "distribution_path": "org/gated"
    },
    "odd": {
        "distribution_channel": "Carrier-Pigeon",
        "distribution_path": "coop/7"
    }
}"#;

/// Transport serving canned repositories and URLs
#[derive(Default)]
struct StubTransport {
    calls: Arc<AtomicUsize>,
    /// Content returned for every download; varied to tell runs apart
    payload: String,
}

impl Transport for StubTransport {
    fn list_repo_files(&self, repo_id: &str, _: &str, token: Option<&str>) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match repo_id {
            "org/gated" if token.is_none() => Err(PullError::Http {
                url: format!("https://hub/api/models/{repo_id}"),
                status: 401,
            }),
            "org/gated" | "org/snap" => Ok(vec![
                "config.json".to_string(),
                "model.safetensors".to_string(),
                "pytorch_model.bin".to_string(),
                "tokenizer.model".to_string(),
            ]),
            _ => Err(PullError::Http {
                url: format!("https://hub/api/models/{repo_id}"),
                status: 404,
            }),
        }
    }

    fn download_repo_file(
        &self,
        _: &str,
        _: &str,
        filename: &str,
        _: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::write(dest, format!("{filename}:{}", self.payload))?;
        Ok(())
    }

    fn download_url(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.ends_with("fail.bin") {
            return Err(PullError::Network(format!("{url}: connection reset")));
        }
        fs::write(dest, format!("{url}:{}", self.payload))?;
        Ok(())
    }
}

/// Converter that writes `model.pth` and records what it saw
#[derive(Default)]
struct StubConverter {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(PathBuf, String, bool, Vec<String>)>>>,
    fail: bool,
}

impl Converter for StubConverter {
    fn convert(&self, model_dir: &Path, model_name: &str, remove_originals: bool) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((
            model_dir.to_path_buf(),
            model_name.to_string(),
            remove_originals,
            file_names(model_dir),
        ));

        fs::write(model_dir.join("model.pth"), "converted")?;
        if self.fail {
            return Err(PullError::Conversion("unsupported checkpoint".to_string()));
        }
        if remove_originals {
            fs::remove_file(model_dir.join("pytorch_model.bin"))?;
        }
        Ok(())
    }
}

/// Resolver that counts lookups before delegating to a catalog
struct CountingResolver {
    catalog: ModelCatalog,
    calls: Arc<AtomicUsize>,
}

impl ConfigResolver for CountingResolver {
    fn resolve(&self, model: &str) -> Result<ModelConfig> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.catalog.resolve(model)
    }
}

struct Harness {
    _temp_dir: TempDir,
    root: PathBuf,
    transport_calls: Arc<AtomicUsize>,
    converter_calls: Arc<AtomicUsize>,
    converter_seen: Arc<Mutex<Vec<(PathBuf, String, bool, Vec<String>)>>>,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("models");
        Self {
            _temp_dir: temp_dir,
            root,
            transport_calls: Arc::new(AtomicUsize::new(0)),
            converter_calls: Arc::new(AtomicUsize::new(0)),
            converter_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn publisher(&self, payload: &str, converter_fails: bool) -> Publisher {
        let transport = StubTransport {
            calls: Arc::clone(&self.transport_calls),
            payload: payload.to_string(),
        };
        let converter = StubConverter {
            calls: Arc::clone(&self.converter_calls),
            seen: Arc::clone(&self.converter_seen),
            fail: converter_fails,
        };
        Publisher::new(
            self.root.clone(),
            Box::new(ModelCatalog::from_json(CATALOG).unwrap()),
            Box::new(transport),
            Box::new(converter),
        )
    }

    fn staging_dir(&self, name: &str) -> PathBuf {
        self.root.join(".downloads").join(name)
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn snapshot_of(dir: &Path) -> BTreeMap<String, String> {
    file_names(dir)
        .into_iter()
        .map(|name| {
            let content = fs::read_to_string(dir.join(&name)).unwrap();
            (name, content)
        })
        .collect()
}

#[test]
fn test_direct_channel_publishes_files_without_conversion() {
    let harness = Harness::new();
    let publisher = harness.publisher("v1", false);

    let model_dir = publisher.download_and_convert("m").unwrap();

    assert_eq!(model_dir, harness.root.join("m"));
    assert_eq!(file_names(&model_dir), vec!["a.bin", "b.bin"]);
    assert_eq!(harness.converter_calls.load(Ordering::SeqCst), 0);
    assert!(!harness.staging_dir("m").exists());
}

#[test]
fn test_snapshot_channel_converts_once_in_staging() {
    let harness = Harness::new();
    let publisher = harness.publisher("v1", false);

    let model_dir = publisher.download_and_convert("snap").unwrap();

    assert_eq!(model_dir, harness.root.join("org").join("snap"));
    assert_eq!(harness.converter_calls.load(Ordering::SeqCst), 1);

    let seen = harness.converter_seen.lock().unwrap();
    let (dir, name, remove_originals, files) = &seen[0];
    assert_eq!(dir, &harness.staging_dir("org/snap"));
    assert_eq!(name, "org/snap");
    assert!(remove_originals);
    // safetensors variants are skipped before conversion
    assert_eq!(files, &vec!["config.json", "pytorch_model.bin", "tokenizer.model"]);

    assert_eq!(
        file_names(&model_dir),
        vec!["config.json", "model.pth", "tokenizer.model"]
    );
    assert!(!harness.staging_dir("org/snap").exists());
}

#[test]
fn test_fetch_failure_leaves_previous_model_untouched() {
    let harness = Harness::new();
    let stable = harness.root.join("broken");
    fs::create_dir_all(&stable).unwrap();
    fs::write(stable.join("a.bin"), "old-a").unwrap();
    fs::write(stable.join("fail.bin"), "old-fail").unwrap();
    let before = snapshot_of(&stable);

    let err = harness
        .publisher("v2", false)
        .download_and_convert("broken")
        .unwrap_err();

    assert!(matches!(err, PullError::Network(_)));
    assert_eq!(snapshot_of(&stable), before);
    assert!(!harness.staging_dir("broken").exists());
}

#[test]
fn test_fetch_failure_without_previous_model_publishes_nothing() {
    let harness = Harness::new();

    let result = harness.publisher("v1", false).download_and_convert("broken");

    assert!(result.is_err());
    assert!(!harness.root.join("broken").exists());
    assert!(!harness.staging_dir("broken").exists());
}

#[test]
fn test_conversion_failure_leaves_previous_model_untouched() {
    let harness = Harness::new();
    harness.publisher("v1", false).download_and_convert("snap").unwrap();
    let stable = harness.root.join("org").join("snap");
    let before = snapshot_of(&stable);

    let err = harness
        .publisher("v2", true)
        .download_and_convert("snap")
        .unwrap_err();

    assert!(matches!(err, PullError::Conversion(_)));
    assert_eq!(snapshot_of(&stable), before);
    assert!(!harness.staging_dir("org/snap").exists());
}

#[test]
fn test_republish_replaces_and_is_repeatable() {
    let harness = Harness::new();
    let publisher = harness.publisher("v1", false);

    let first_dir = publisher.download_and_convert("m").unwrap();
    let first = snapshot_of(&first_dir);
    let second_dir = publisher.download_and_convert("m").unwrap();

    assert_eq!(first_dir, second_dir);
    assert_eq!(snapshot_of(&second_dir), first);
    assert!(!harness.staging_dir("m").exists());

    // last write wins: a newer download replaces the old contents entirely
    fs::write(second_dir.join("stray.txt"), "left over").unwrap();
    harness.publisher("v2", false).download_and_convert("m").unwrap();
    let third = snapshot_of(&second_dir);
    assert_eq!(third.len(), 2);
    assert_eq!(third["a.bin"], "https://x/a.bin:v2");
}

#[test]
fn test_stale_staging_directory_is_discarded() {
    let harness = Harness::new();
    let stale = harness.staging_dir("m");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("partial.bin"), "interrupted").unwrap();

    let model_dir = harness
        .publisher("v1", false)
        .download_and_convert("m")
        .unwrap();

    assert_eq!(file_names(&model_dir), vec!["a.bin", "b.bin"]);
    assert!(!stale.exists());
}

#[test]
fn test_presence_check() {
    let harness = Harness::new();
    let publisher = harness.publisher("v1", false);
    let catalog = ModelCatalog::from_json(CATALOG).unwrap();

    assert!(!publisher.is_model_downloaded("m").unwrap());
    assert!(!is_model_downloaded(&catalog, "m", &harness.root).unwrap());

    publisher.download_and_convert("m").unwrap();
    assert!(publisher.is_model_downloaded("m").unwrap());
    assert!(is_model_downloaded(&catalog, "m", &harness.root).unwrap());

    for entry in fs::read_dir(harness.root.join("m")).unwrap().flatten() {
        fs::remove_file(entry.path()).unwrap();
    }
    assert!(!publisher.is_model_downloaded("m").unwrap());
}

#[test]
fn test_snapshot_unauthorized_maps_to_auth_error() {
    let harness = Harness::new();

    let err = harness
        .publisher("v1", false)
        .download_and_convert("gated")
        .unwrap_err();

    assert!(matches!(err, PullError::AuthRequired { ref repo } if repo == "org/gated"));
    assert!(err.to_string().contains("huggingface-cli login"));
    assert_eq!(harness.converter_calls.load(Ordering::SeqCst), 0);
    assert!(!harness.root.join("gated").exists());
    assert!(!harness.staging_dir("gated").exists());
}

#[test]
fn test_snapshot_with_token_is_authorized() {
    let harness = Harness::new();

    let model_dir = harness
        .publisher("v1", false)
        .with_token(Some("hf_secret".to_string()))
        .download_and_convert("gated")
        .unwrap();

    assert!(model_dir.join("model.pth").exists());
}

#[test]
fn test_unknown_channel_fails_before_network() {
    let harness = Harness::new();

    let err = harness
        .publisher("v1", false)
        .download_and_convert("odd")
        .unwrap_err();

    assert!(matches!(err, PullError::Config(_)));
    assert_eq!(harness.transport_calls.load(Ordering::SeqCst), 0);
    assert!(!harness.staging_dir("odd").exists());
    assert!(!harness.root.join("odd").exists());
}

#[test]
fn test_unknown_model_is_not_found() {
    let harness = Harness::new();
    let err = harness
        .publisher("v1", false)
        .download_and_convert("snp")
        .unwrap_err();

    assert!(matches!(err, PullError::NotFound(_)));
    assert!(err.to_string().contains("Did you mean 'snap'?"));
    assert_eq!(harness.transport_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_custom_resolver_is_consulted() {
    let harness = Harness::new();
    let resolver_calls = Arc::new(AtomicUsize::new(0));
    let publisher = Publisher::new(
        harness.root.clone(),
        Box::new(CountingResolver {
            catalog: ModelCatalog::from_json(CATALOG).unwrap(),
            calls: Arc::clone(&resolver_calls),
        }),
        Box::new(StubTransport::default()),
        Box::new(StubConverter::default()),
    );

    publisher.download_and_convert("m").unwrap();
    assert!(publisher.is_model_downloaded("m").unwrap());
    assert_eq!(resolver_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_where_and_remove() {
    let harness = Harness::new();
    let publisher = harness.publisher("v1", false);

    assert_eq!(
        publisher.model_dir("snap").unwrap(),
        harness.root.join("org").join("snap")
    );
    assert!(!publisher.remove("m").unwrap());

    publisher.download_and_convert("m").unwrap();
    fs::create_dir_all(harness.staging_dir("m")).unwrap();

    assert!(publisher.remove("m").unwrap());
    assert!(!harness.root.join("m").exists());
    assert!(!harness.staging_dir("m").exists());
    assert!(!publisher.is_model_downloaded("m").unwrap());
}

#[test]
fn test_ignore_patterns_are_configurable() {
    let harness = Harness::new();
    let publisher = harness
        .publisher("v1", false)
        .with_ignore_patterns(&["*.json".to_string()])
        .unwrap();

    publisher.download_and_convert("snap").unwrap();

    let seen = harness.converter_seen.lock().unwrap();
    assert_eq!(
        seen[0].3,
        vec!["model.safetensors", "pytorch_model.bin", "tokenizer.model"]
    );
    drop(seen);

    assert!(matches!(
        harness.publisher("v1", false).with_ignore_patterns(&["[".to_string()]),
        Err(PullError::Config(_))
    ));
}

#[test]
fn test_source_variants_match_catalog() {
    let catalog = ModelCatalog::from_json(CATALOG).unwrap();
    assert_eq!(
        catalog.resolve("m").unwrap().source,
        ModelSource::Direct {
            urls: vec!["https://x/a.bin".to_string(), "https://x/b.bin".to_string()]
        }
    );
}
