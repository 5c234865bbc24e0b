//! Environment composition.
//!
//! An environment is a named, file-backed deployment target. Its name
//! decomposes into an ancestor hierarchy (`a-b-c` is composed from
//! `a.yml`, `a-b.yml`, `a-b-c.yml`), extended by `genesis.inherits`
//! references and bracketed by a generated prologue and epilogue. The
//! composer produces two views: the parameter view (merged with
//! evaluation suppressed) and the manifest view (fully evaluated, with
//! kit fragments and director configs, falling back to the adaptive
//! merge when references cannot resolve).

use genesis_manifest::{adaptive_merge, ManifestCache, MergeOptions, Merger};
use genesis_types::{EnvName, GenesisError, Result, SemVer};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A reaction hook declared in the environment file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reaction {
    /// Repo-relative script to run.
    #[serde(default)]
    pub script: Option<String>,
    /// Kit addon to invoke.
    #[serde(default)]
    pub addon: Option<String>,
    /// Arguments passed to the script or addon.
    #[serde(default)]
    pub args: Vec<String>,
    /// When set, the entry's stdout is captured into this variable for
    /// subsequent reactions.
    #[serde(default)]
    pub var: Option<String>,
}

impl Reaction {
    /// Reject entries that are neither script nor addon (or both).
    pub fn validate(&self) -> Result<()> {
        match (&self.script, &self.addon) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(GenesisError::Config(
                "reactions entries must set exactly one of 'script' or 'addon'".to_string(),
            )),
        }
    }
}

/// Reactions by pipeline phase.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reactions {
    /// Run after the pre-deploy hook, before the deploy; first failure
    /// aborts.
    #[serde(default, rename = "pre-deploy")]
    pub pre_deploy: Vec<Reaction>,
    /// Run after the deploy, successful or not.
    #[serde(default, rename = "post-deploy")]
    pub post_deploy: Vec<Reaction>,
}

/// Reference to the deploying BOSH director:
/// `<alias>[/<type>][@[url/]mount]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoshEnvRef {
    /// Director environment alias.
    pub alias: String,
    /// Deployment type of the director's own exodus data.
    pub deploy_type: Option<String>,
    /// Exodus mount (optionally prefixed with a store URL) to read the
    /// director's connection data from.
    pub mount: Option<String>,
}

impl BoshEnvRef {
    /// Parse the `genesis.bosh_env` shorthand.
    pub fn parse(reference: &str) -> Self {
        let (left, mount) = match reference.split_once('@') {
            Some((l, m)) => (l, Some(m.to_string())),
            None => (reference, None),
        };
        let (alias, deploy_type) = match left.split_once('/') {
            Some((a, t)) => (a.to_string(), Some(t.to_string())),
            None => (left.to_string(), None),
        };
        Self {
            alias,
            deploy_type,
            mount,
        }
    }
}

/// The recognized `genesis:` block of an environment file, as read from
/// one file (all fields optional so sparse ancestors overlay cleanly).
#[derive(Debug, Clone, Default, Deserialize)]
struct RawGenesisBlock {
    env: Option<String>,
    min_version: Option<String>,
    bosh_env: Option<String>,
    use_create_env: Option<bool>,
    credhub_env: Option<String>,
    root_ca_path: Option<String>,
    secrets_mount: Option<String>,
    secrets_path: Option<String>,
    exodus_mount: Option<String>,
    ci_mount: Option<String>,
    #[serde(default)]
    inherits: Vec<String>,
    reactions: Option<Reactions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawKitBlock {
    name: Option<String>,
    version: Option<String>,
    features: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawEnvFile {
    #[serde(default)]
    genesis: Option<RawGenesisBlock>,
    #[serde(default)]
    kit: Option<RawKitBlock>,
}

/// Resolved environment configuration after overlaying every file of the
/// hierarchy (later files win).
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// `genesis.min_version`
    pub min_version: Option<String>,
    /// `genesis.bosh_env`
    pub bosh_env: Option<String>,
    /// `genesis.use_create_env`
    pub use_create_env: bool,
    /// `genesis.credhub_env`
    pub credhub_env: Option<String>,
    /// `genesis.root_ca_path`
    pub root_ca_path: Option<String>,
    /// `genesis.secrets_mount`
    pub secrets_mount: Option<String>,
    /// `genesis.secrets_path`
    pub secrets_path: Option<String>,
    /// `genesis.exodus_mount`
    pub exodus_mount: Option<String>,
    /// `genesis.ci_mount`
    pub ci_mount: Option<String>,
    /// `genesis.reactions`
    pub reactions: Reactions,
    /// `kit.name`
    pub kit_name: Option<String>,
    /// `kit.version`
    pub kit_version: Option<String>,
    /// `kit.features`
    pub features: Vec<String>,
}

impl EnvConfig {
    fn overlay(&mut self, raw: &RawEnvFile) {
        if let Some(g) = &raw.genesis {
            macro_rules! take {
                ($field:ident) => {
                    if let Some(v) = &g.$field {
                        self.$field = Some(v.clone());
                    }
                };
            }
            take!(min_version);
            take!(bosh_env);
            take!(credhub_env);
            take!(root_ca_path);
            take!(secrets_mount);
            take!(secrets_path);
            take!(exodus_mount);
            take!(ci_mount);
            if let Some(v) = g.use_create_env {
                self.use_create_env = v;
            }
            if let Some(r) = &g.reactions {
                self.reactions = r.clone();
            }
        }
        if let Some(k) = &raw.kit {
            if let Some(v) = &k.name {
                self.kit_name = Some(v.clone());
            }
            if let Some(v) = &k.version {
                self.kit_version = Some(v.clone());
            }
            if let Some(v) = &k.features {
                self.features = v.clone();
            }
        }
    }
}

/// A named, file-backed deployment target.
pub struct Environment {
    name: EnvName,
    root: PathBuf,
    files: Vec<PathBuf>,
    config: EnvConfig,
    merger: Arc<dyn Merger>,
    cache: ManifestCache,
    // parameter view, cached against the working directory it was built
    // in; a cwd change invalidates it
    params_cache: Mutex<Option<(PathBuf, serde_yaml::Value)>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("files", &self.files)
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("params_cache", &self.params_cache)
            .finish()
    }
}

impl Environment {
    /// Load the environment `name` from the repo at `root`.
    ///
    /// The environment's own file must exist and must declare its own
    /// name in `genesis.env`; `genesis.min_version` is enforced against
    /// the running engine.
    pub fn load(root: impl AsRef<Path>, name: &EnvName, merger: Arc<dyn Merger>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let cache = ManifestCache::new(&root);

        let own_file = root.join(format!("{}.yml", name));
        if !own_file.is_file() {
            return Err(GenesisError::Environment(format!(
                "Environment file {} does not exist",
                own_file.display()
            )));
        }

        let files = compose_file_list(&root, name, &cache)?;

        let mut config = EnvConfig::default();
        let mut declared_env: Option<String> = None;
        for file in &files {
            let raw = read_env_file(file)?;
            if *file == own_file {
                declared_env = raw.genesis.as_ref().and_then(|g| g.env.clone());
            }
            config.overlay(&raw);
        }

        match declared_env {
            Some(env) if env == name.as_str() => {}
            Some(env) => {
                return Err(GenesisError::Environment(format!(
                    "{} declares genesis.env '{}', which does not match the \
                     environment name '{}'",
                    own_file.display(),
                    env,
                    name
                )))
            }
            None => {
                return Err(GenesisError::Environment(format!(
                    "{} does not declare genesis.env",
                    own_file.display()
                )))
            }
        }

        if let Some(min) = &config.min_version {
            let min = SemVer::parse(min)?;
            let running = SemVer::parse(genesis_core::VERSION)?;
            if !running.meets_requirement(&min) {
                return Err(GenesisError::Dependency(format!(
                    "Environment {} requires Genesis {} or later (this is {})",
                    name,
                    min,
                    genesis_core::VERSION
                )));
            }
        }

        debug!("loaded environment {} ({} file(s))", name, files.len());
        Ok(Self {
            name: name.clone(),
            root,
            files,
            config,
            merger,
            cache,
            params_cache: Mutex::new(None),
        })
    }

    /// Environment name.
    pub fn name(&self) -> &EnvName {
        &self.name
    }

    /// Repo root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolved configuration.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Manifest cache for this repo.
    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    /// The hierarchy files in merge order (ancestors plus inherits).
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Deployment type: the kit name.
    pub fn deploy_type(&self) -> Result<&str> {
        self.config
            .kit_name
            .as_deref()
            .ok_or_else(|| {
                GenesisError::Config(format!(
                    "Environment {} does not declare kit.name",
                    self.name
                ))
            })
    }

    /// BOSH deployment name, `<env>-<type>`.
    pub fn deployment_name(&self) -> Result<String> {
        Ok(format!("{}-{}", self.name, self.deploy_type()?))
    }

    /// The director reference, defaulting to the environment's own name.
    pub fn bosh_env(&self) -> BoshEnvRef {
        match &self.config.bosh_env {
            Some(reference) => BoshEnvRef::parse(reference),
            None => BoshEnvRef::parse(self.name.as_str()),
        }
    }

    /// Secrets mount, normalized to `x/.../` form.
    pub fn secrets_mount(&self) -> String {
        normalize_mount(self.config.secrets_mount.as_deref().unwrap_or("secret"))
    }

    /// Secrets path under the mount; defaults to the hyphen-to-slash
    /// environment name followed by the deployment type.
    pub fn secrets_path(&self) -> Result<String> {
        match &self.config.secrets_path {
            Some(path) => Ok(path.trim_matches('/').to_string()),
            None => Ok(format!(
                "{}/{}",
                self.name.as_str().replace('-', "/"),
                self.deploy_type()?
            )),
        }
    }

    /// Secrets base: mount + path, trailing slash included.
    pub fn secrets_base(&self) -> Result<String> {
        Ok(format!("{}{}/", self.secrets_mount(), self.secrets_path()?))
    }

    /// Exodus mount, normalized.
    pub fn exodus_mount(&self) -> String {
        normalize_mount(self.config.exodus_mount.as_deref().unwrap_or("secret/exodus"))
    }

    /// Exodus base for this environment: `<mount><env>/<type>`.
    pub fn exodus_base(&self) -> Result<String> {
        Ok(format!(
            "{}{}/{}",
            self.exodus_mount(),
            self.name,
            self.deploy_type()?
        ))
    }

    /// CI mount, normalized.
    pub fn ci_mount(&self) -> String {
        normalize_mount(self.config.ci_mount.as_deref().unwrap_or("secret/ci"))
    }

    /// The generated prologue document: defaults every merge sees first.
    pub fn prologue(&self) -> Result<String> {
        Ok(format!(
            concat!(
                "---\n",
                "meta:\n",
                "  vault: {}\n",
                "exodus: {{}}\n",
                "genesis: {{}}\n",
                "kit:\n",
                "  features: []\n",
                "params: {{}}\n",
            ),
            self.secrets_base()?.trim_end_matches('/')
        ))
    }

    /// The generated epilogue document: pins the deployment name, secret
    /// mounts, and the Exodus metadata skeleton.
    pub fn epilogue(&self, features: &[String]) -> Result<String> {
        let deployer = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        Ok(format!(
            concat!(
                "---\n",
                "name: {name}\n",
                "genesis:\n",
                "  env: {env}\n",
                "  secrets_mount: {smount}\n",
                "  secrets_path: {spath}\n",
                "  exodus_mount: {emount}\n",
                "  ci_mount: {cmount}\n",
                "exodus:\n",
                "  version: {version}\n",
                "  dated: \"{dated}\"\n",
                "  deployer: {deployer}\n",
                "  kit_name: {kit_name}\n",
                "  kit_version: {kit_version}\n",
                "  features: \"{features}\"\n",
                "  bosh: {bosh}\n",
                "  vault_base: {vault_base}\n",
            ),
            name = self.deployment_name()?,
            env = self.name,
            smount = self.secrets_mount(),
            spath = self.secrets_path()?,
            emount = self.exodus_mount(),
            cmount = self.ci_mount(),
            version = genesis_core::VERSION,
            dated = chrono::Utc::now().to_rfc3339(),
            deployer = deployer,
            kit_name = self.config.kit_name.as_deref().unwrap_or("unknown"),
            kit_version = self.config.kit_version.as_deref().unwrap_or("unknown"),
            features = features.join(","),
            bosh = self.bosh_env().alias,
            vault_base = self.secrets_base()?.trim_end_matches('/'),
        ))
    }

    fn hierarchy_docs(&self) -> Result<Vec<String>> {
        self.files
            .iter()
            .map(|f| genesis_core::fs::read_file(f))
            .collect()
    }

    /// The parameter view: prologue + hierarchy + epilogue, merged with
    /// evaluation suppressed. Built lazily and cached; a working
    /// directory change invalidates the cache.
    pub fn params(&self) -> Result<serde_yaml::Value> {
        let cwd = std::env::current_dir()?;
        {
            let cache = self.params_cache.lock().unwrap();
            if let Some((at, value)) = &*cache {
                if *at == cwd {
                    return Ok(value.clone());
                }
            }
        }

        let mut docs = vec![self.prologue()?];
        docs.extend(self.hierarchy_docs()?);
        docs.push(self.epilogue(&self.config.features)?);

        // merge-tool file operators resolve relative to the repo root;
        // the guard restores the previous directory on every exit path
        let merged = {
            let _workdir = genesis_core::fs::WorkdirGuard::enter(&self.root)?;
            self.merger.merge_docs(&docs, &MergeOptions::skip_eval())?
        };
        let value: serde_yaml::Value = serde_yaml::from_str(&merged)?;

        *self.params_cache.lock().unwrap() = Some((cwd, value.clone()));
        Ok(value)
    }

    /// The manifest view: prologue + kit fragments + director configs +
    /// hierarchy + epilogue, fully evaluated. Unresolvable operators are
    /// deferred by the adaptive merge.
    pub fn manifest(
        &self,
        features: &[String],
        kit_fragments: &[PathBuf],
        config_files: &[PathBuf],
        merge_env: &std::collections::BTreeMap<String, String>,
    ) -> Result<String> {
        let mut docs = vec![self.prologue()?];
        for file in kit_fragments {
            docs.push(genesis_core::fs::read_file(file)?);
        }
        for file in config_files {
            docs.push(genesis_core::fs::read_file(file)?);
        }
        docs.extend(self.hierarchy_docs()?);
        docs.push(self.epilogue(features)?);

        let opts = MergeOptions {
            env: merge_env.clone(),
            ..Default::default()
        };
        let _workdir = genesis_core::fs::WorkdirGuard::enter(&self.root)?;
        adaptive_merge(self.merger.as_ref(), &docs, &opts)
    }

    /// Look up the first defined value among dotted `paths` in the
    /// parameter view.
    pub fn lookup(&self, paths: &[&str]) -> Result<Option<serde_yaml::Value>> {
        let params = self.params()?;
        for path in paths {
            if let Some(value) = lookup_path(&params, path) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(None)
    }

    /// Like [`Environment::lookup`], with a lazily computed default.
    pub fn lookup_or_else<F>(&self, paths: &[&str], default: F) -> Result<serde_yaml::Value>
    where
        F: FnOnce() -> serde_yaml::Value,
    {
        Ok(self.lookup(paths)?.unwrap_or_else(default))
    }
}

/// Navigate a dotted path through mappings.
pub fn lookup_path<'a>(value: &'a serde_yaml::Value, path: &str) -> Option<&'a serde_yaml::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn normalize_mount(mount: &str) -> String {
    format!("{}/", mount.trim_matches('/'))
}

fn read_env_file(path: &Path) -> Result<RawEnvFile> {
    let content = genesis_core::fs::read_file(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        GenesisError::Config(format!("Malformed environment file {}: {}", path.display(), e))
    })
}

/// Resolve an environment file by name: the repo root first, then the
/// cache of files propagated from upstream.
fn resolve_env_file(
    root: &Path,
    env: &EnvName,
    cache: &ManifestCache,
    name: &str,
) -> Option<PathBuf> {
    let direct = root.join(format!("{}.yml", name));
    if direct.is_file() {
        return Some(direct);
    }
    cache.cached_file(env.as_str(), name)
}

/// Build the ordered hierarchy list: ancestor files that exist, each
/// preceded by any files its `genesis.inherits` pulls in (transitively).
fn compose_file_list(root: &Path, env: &EnvName, cache: &ManifestCache) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();

    for ancestor in env.ancestors() {
        let Some(path) = resolve_env_file(root, env, cache, &ancestor) else {
            continue;
        };
        insert_with_inherits(root, env, cache, &path, &mut files, &mut seen, 0)?;
    }

    Ok(files)
}

fn insert_with_inherits(
    root: &Path,
    env: &EnvName,
    cache: &ManifestCache,
    path: &Path,
    files: &mut Vec<PathBuf>,
    seen: &mut BTreeSet<PathBuf>,
    depth: usize,
) -> Result<()> {
    if seen.contains(path) {
        return Ok(());
    }
    if depth > 16 {
        return Err(GenesisError::Config(format!(
            "genesis.inherits chain through {} is too deep (cycle?)",
            path.display()
        )));
    }
    seen.insert(path.to_path_buf());

    let raw = read_env_file(path)?;
    if let Some(genesis) = &raw.genesis {
        for inherited in &genesis.inherits {
            let Some(inherited_path) = resolve_env_file(root, env, cache, inherited) else {
                return Err(GenesisError::Config(format!(
                    "{} inherits '{}', but no such environment file exists",
                    path.display(),
                    inherited
                )));
            };
            insert_with_inherits(root, env, cache, &inherited_path, files, seen, depth + 1)?;
        }
    }

    files.push(path.to_path_buf());
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Deep-merge stub standing in for the external merge tool; later
    /// documents win on scalar conflicts, mappings merge recursively.
    pub(crate) struct SimpleMerger;

    fn deep_merge(base: &mut serde_yaml::Value, layer: serde_yaml::Value) {
        match (base, layer) {
            (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(layer)) => {
                for (k, v) in layer {
                    match base.get_mut(&k) {
                        Some(existing) => deep_merge(existing, v),
                        None => {
                            base.insert(k, v);
                        }
                    }
                }
            }
            (base, layer) => *base = layer,
        }
    }

    impl Merger for SimpleMerger {
        fn merge_files(
            &self,
            files: &[PathBuf],
            opts: &MergeOptions,
        ) -> genesis_types::Result<String> {
            let docs: Vec<String> = files
                .iter()
                .map(|f| std::fs::read_to_string(f).unwrap())
                .collect();
            self.merge_docs(&docs, opts)
        }

        fn merge_docs(
            &self,
            docs: &[String],
            _opts: &MergeOptions,
        ) -> genesis_types::Result<String> {
            let mut merged = serde_yaml::Value::Mapping(Default::default());
            for doc in docs {
                let value: serde_yaml::Value = serde_yaml::from_str(doc)?;
                if !value.is_null() {
                    deep_merge(&mut merged, value);
                }
            }
            Ok(serde_yaml::to_string(&merged)?)
        }
    }

    fn write(root: &Path, name: &str, content: &str) {
        std::fs::write(root.join(format!("{}.yml", name)), content).unwrap();
    }

    fn load(root: &Path, name: &str) -> Result<Environment> {
        Environment::load(root, &EnvName::new(name).unwrap(), Arc::new(SimpleMerger))
    }

    #[test]
    fn test_load_requires_identity() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "us-west",
            "genesis:\n  env: us-west\nkit:\n  name: shield\n  version: 2.1.0\n",
        );
        assert!(load(dir.path(), "us-west").is_ok());

        write(dir.path(), "us-east", "genesis:\n  env: wrong-name\n");
        let err = load(dir.path(), "us-east").unwrap_err();
        assert!(err.to_string().contains("does not match"));

        write(dir.path(), "us-south", "params:\n  x: 1\n");
        let err = load(dir.path(), "us-south").unwrap_err();
        assert!(err.to_string().contains("does not declare genesis.env"));

        assert!(load(dir.path(), "nonexistent-env").is_err());
    }

    #[test]
    fn test_hierarchy_file_list() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "params:\n  x: 1\n");
        write(dir.path(), "a-b", "params: {}\n");
        write(
            dir.path(),
            "a-b-c",
            "genesis:\n  env: a-b-c\nkit:\n  name: shield\n  version: 2.1.0\n",
        );

        let env = load(dir.path(), "a-b-c").unwrap();
        let names: Vec<String> = env
            .files()
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.yml", "a-b.yml", "a-b-c.yml"]);
    }

    #[test]
    fn test_missing_ancestors_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "a-b-c",
            "genesis:\n  env: a-b-c\nkit:\n  name: shield\n  version: 2.1.0\n",
        );

        let env = load(dir.path(), "a-b-c").unwrap();
        assert_eq!(env.files().len(), 1);
    }

    #[test]
    fn test_inherits_inserted_before_referencing_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "common", "params:\n  shared: yes\n");
        write(dir.path(), "a", "genesis:\n  inherits: [common]\n");
        write(
            dir.path(),
            "a-b",
            "genesis:\n  env: a-b\nkit:\n  name: shield\n  version: 2.1.0\n",
        );

        let env = load(dir.path(), "a-b").unwrap();
        let names: Vec<String> = env
            .files()
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["common.yml", "a.yml", "a-b.yml"]);
    }

    #[test]
    fn test_inherits_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "genesis:\n  inherits: [nonesuch]\n");
        write(dir.path(), "a-b", "genesis:\n  env: a-b\n");

        let err = load(dir.path(), "a-b").unwrap_err();
        assert!(err.to_string().contains("nonesuch"));
    }

    #[test]
    fn test_inheritance_lookup() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "params:\n  x: 1\n");
        write(
            dir.path(),
            "a-b",
            "genesis:\n  env: a-b\nkit:\n  name: shield\n  version: 2.1.0\n",
        );

        let env = load(dir.path(), "a-b").unwrap();
        let x = env.lookup(&["params.x"]).unwrap().unwrap();
        assert_eq!(x.as_i64(), Some(1));

        // an override in the child wins
        write(
            dir.path(),
            "a-b",
            "genesis:\n  env: a-b\nkit:\n  name: shield\n  version: 2.1.0\nparams:\n  x: 2\n",
        );
        let env = load(dir.path(), "a-b").unwrap();
        let x = env.lookup(&["params.x"]).unwrap().unwrap();
        assert_eq!(x.as_i64(), Some(2));
    }

    #[test]
    fn test_lookup_alternatives_and_default() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "lab",
            "genesis:\n  env: lab\nkit:\n  name: shield\n  version: 2.1.0\nparams:\n  present: here\n",
        );

        let env = load(dir.path(), "lab").unwrap();
        let found = env
            .lookup(&["params.absent", "params.present"])
            .unwrap()
            .unwrap();
        assert_eq!(found, serde_yaml::Value::String("here".to_string()));

        let fallback = env
            .lookup_or_else(&["params.absent"], || {
                serde_yaml::Value::String("default".to_string())
            })
            .unwrap();
        assert_eq!(fallback, serde_yaml::Value::String("default".to_string()));
    }

    #[test]
    fn test_params_idempotent() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "lab",
            "genesis:\n  env: lab\nkit:\n  name: shield\n  version: 2.1.0\nparams:\n  x: 1\n",
        );

        let env = load(dir.path(), "lab").unwrap();
        let first = env.params().unwrap();
        let second = env.params().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mount_defaults_and_overrides() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "us-west-prod",
            concat!(
                "genesis:\n",
                "  env: us-west-prod\n",
                "kit:\n  name: cf\n  version: 1.0.0\n",
            ),
        );

        let env = load(dir.path(), "us-west-prod").unwrap();
        assert_eq!(env.secrets_mount(), "secret/");
        assert_eq!(env.secrets_path().unwrap(), "us/west/prod/cf");
        assert_eq!(env.secrets_base().unwrap(), "secret/us/west/prod/cf/");
        assert_eq!(env.exodus_base().unwrap(), "secret/exodus/us-west-prod/cf");
        assert_eq!(env.deployment_name().unwrap(), "us-west-prod-cf");

        write(
            dir.path(),
            "us-west-prod",
            concat!(
                "genesis:\n",
                "  env: us-west-prod\n",
                "  secrets_mount: /vault/kv/\n",
                "  secrets_path: custom/path\n",
                "kit:\n  name: cf\n  version: 1.0.0\n",
            ),
        );
        let env = load(dir.path(), "us-west-prod").unwrap();
        assert_eq!(env.secrets_base().unwrap(), "vault/kv/custom/path/");
    }

    #[test]
    fn test_bosh_env_ref_parsing() {
        let r = BoshEnvRef::parse("prod-bosh");
        assert_eq!(r.alias, "prod-bosh");
        assert_eq!(r.deploy_type, None);
        assert_eq!(r.mount, None);

        let r = BoshEnvRef::parse("prod-bosh/bosh@secret/exodus");
        assert_eq!(r.alias, "prod-bosh");
        assert_eq!(r.deploy_type.as_deref(), Some("bosh"));
        assert_eq!(r.mount.as_deref(), Some("secret/exodus"));

        let r = BoshEnvRef::parse("mgmt@https://vault.example/secret/exodus");
        assert_eq!(r.alias, "mgmt");
        assert_eq!(r.mount.as_deref(), Some("https://vault.example/secret/exodus"));
    }

    #[test]
    fn test_min_version_gate() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "lab",
            concat!(
                "genesis:\n",
                "  env: lab\n",
                "  min_version: 99.0.0\n",
                "kit:\n  name: shield\n  version: 2.1.0\n",
            ),
        );

        let err = load(dir.path(), "lab").unwrap_err();
        assert!(matches!(err, GenesisError::Dependency(_)));
    }

    #[test]
    fn test_reaction_validation() {
        let ok = Reaction {
            script: Some("bin/notify".to_string()),
            addon: None,
            args: vec![],
            var: None,
        };
        assert!(ok.validate().is_ok());

        let both = Reaction {
            script: Some("bin/notify".to_string()),
            addon: Some("slack".to_string()),
            args: vec![],
            var: None,
        };
        assert!(both.validate().is_err());

        let neither = Reaction {
            script: None,
            addon: None,
            args: vec![],
            var: None,
        };
        assert!(neither.validate().is_err());
    }

    #[test]
    fn test_epilogue_pins_identity() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "lab",
            "genesis:\n  env: lab\nkit:\n  name: shield\n  version: 2.1.0\n",
        );

        let env = load(dir.path(), "lab").unwrap();
        let epilogue = env.epilogue(&["base".to_string(), "ha".to_string()]).unwrap();
        assert!(epilogue.contains("name: lab-shield"));
        assert!(epilogue.contains("features: \"base,ha\""));
        assert!(epilogue.contains("kit_name: shield"));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&epilogue).unwrap();
        assert!(lookup_path(&parsed, "exodus.dated").is_some());
        assert!(lookup_path(&parsed, "exodus.deployer").is_some());
    }
}
