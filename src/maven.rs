use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha512};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::coordinate::Coordinate;

pub const DEFAULT_MAVEN_URL: &str =
    "tgz+https://dlcdn.apache.org/maven/maven-3/3.9.9/binaries/apache-maven-3.9.9-bin.tar.gz";
pub const DEFAULT_MAVEN_SHA512: &str = "a555254d6b53d267965a3404ecb14e53c3827c09c3b94b5678835887ab404556bfaf78dcfe03ba76fa2508649dca8531c74bca4d5846513522404d48e8c4ac8b";

#[cfg(windows)]
const MVN_BINARY: &str = "mvn.cmd";
#[cfg(not(windows))]
const MVN_BINARY: &str = "mvn";

fn mvn_command(mvn: &Path, args: &[String]) -> Result<Output> {
    #[cfg(windows)]
    {
        let lower = mvn.to_string_lossy().to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return Command::new("cmd")
                .arg("/C")
                .arg(mvn)
                .args(args)
                .output()
                .with_context(|| format!("Failed to execute {}", mvn.display()));
        }
    }

    Command::new(mvn)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute {}", mvn.display()))
}

#[derive(Debug, Clone)]
pub struct Maven {
    mvn: PathBuf,
    local_repo: Option<PathBuf>,
}

impl Maven {
    pub fn new(mvn: PathBuf, local_repo: Option<PathBuf>) -> Self {
        Self { mvn, local_repo }
    }

    fn run(&self, pom: &Path, goal_args: &[String]) -> Result<Output> {
        let mut args = vec!["-B".to_string(), "-q".to_string()];
        args.push("-f".to_string());
        args.push(pom.to_string_lossy().into_owned());
        if let Some(repo) = &self.local_repo {
            args.push(format!("-Dmaven.repo.local={}", repo.display()));
        }
        args.extend_from_slice(goal_args);
        tracing::debug!(mvn = %self.mvn.display(), ?args, "running maven");
        mvn_command(&self.mvn, &args)
    }

    /// Resolves the endpoints and their transitive dependencies into an
    /// ordered list of jar paths.
    pub fn resolve_classpath(&self, endpoints: &[Coordinate]) -> Result<Vec<PathBuf>> {
        let work = tempfile::Builder::new()
            .prefix("maven-stubgen-")
            .tempdir()
            .context("Failed to create temporary directory for pom.xml")?;
        let pom = work.path().join("pom.xml");
        fs::write(&pom, render_pom(endpoints))
            .with_context(|| format!("Failed to write {}", pom.display()))?;
        let cp_file = work.path().join("classpath.txt");

        let output = self.run(
            &pom,
            &[
                "dependency:build-classpath".to_string(),
                format!("-Dmdep.outputFile={}", cp_file.display()),
            ],
        )?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "mvn dependency:build-classpath failed:\n{}\n{}",
                stdout.trim(),
                stderr.trim()
            );
        }

        let raw = fs::read_to_string(&cp_file)
            .with_context(|| format!("mvn did not write {}", cp_file.display()))?;
        Ok(std::env::split_paths(raw.trim())
            .filter(|p| !p.as_os_str().is_empty())
            .collect())
    }

    /// Downloads the `-sources.jar` of an artifact into the local repository.
    /// Returns whether mvn succeeded; failures are only logged.
    pub fn fetch_sources(&self, coordinate: &Coordinate) -> bool {
        let work = match tempfile::Builder::new().prefix("maven-stubgen-").tempdir() {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!("cannot create temporary directory: {err}");
                return false;
            }
        };
        let pom = work.path().join("pom.xml");
        if let Err(err) = fs::write(&pom, render_pom(&[])) {
            tracing::warn!("cannot write {}: {err}", pom.display());
            return false;
        }

        let result = self.run(
            &pom,
            &[
                "dependency:get".to_string(),
                format!("-Dartifact={}", coordinate.sources_artifact()),
                "-Dtransitive=false".to_string(),
            ],
        );
        match result {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                tracing::info!(
                    coordinate = %coordinate,
                    "no sources jar: {}",
                    String::from_utf8_lossy(&out.stdout).trim()
                );
                false
            }
            Err(err) => {
                tracing::warn!(coordinate = %coordinate, "fetching sources failed: {err:#}");
                false
            }
        }
    }
}

/// A throwaway project depending on every endpoint.
pub fn render_pom(endpoints: &[Coordinate]) -> String {
    let mut deps = String::new();
    for c in endpoints {
        deps.push_str("    <dependency>\n");
        deps.push_str(&format!("      <groupId>{}</groupId>\n", xml_escape(&c.group_id)));
        deps.push_str(&format!(
            "      <artifactId>{}</artifactId>\n",
            xml_escape(&c.artifact_id)
        ));
        deps.push_str(&format!("      <version>{}</version>\n", xml_escape(&c.version)));
        deps.push_str(&format!(
            "      <type>{}</type>\n",
            xml_escape(c.packaging_or_jar())
        ));
        if let Some(classifier) = &c.classifier {
            deps.push_str(&format!(
                "      <classifier>{}</classifier>\n",
                xml_escape(classifier)
            ));
        }
        deps.push_str("    </dependency>\n");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>
  <groupId>maven-stubgen</groupId>
  <artifactId>maven-stubgen-resolve</artifactId>
  <version>0</version>
  <packaging>pom</packaging>
  <dependencies>
{deps}  </dependencies>
</project>
"#
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Finds a usable `mvn`: explicit path, `MAVEN_STUBGEN_MVN`, `PATH`, or a
/// distribution installed under `tools_dir`.
pub fn ensure_mvn(explicit: Option<&Path>, tools_dir: &Path) -> Result<PathBuf> {
    if let Some(p) = explicit {
        if !p.exists() {
            bail!("mvn executable not found: {}", p.display());
        }
        return Ok(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("MAVEN_STUBGEN_MVN")
        && !p.is_empty()
    {
        return Ok(PathBuf::from(p));
    }
    if let Ok(p) = which::which("mvn") {
        return Ok(p);
    }

    let (url, sha) = match std::env::var("MAVEN_URL") {
        Ok(url) if !url.is_empty() => (url, std::env::var("MAVEN_SHA").ok()),
        _ => (
            DEFAULT_MAVEN_URL.to_string(),
            Some(DEFAULT_MAVEN_SHA512.to_string()),
        ),
    };
    install_maven(&url, sha.as_deref(), tools_dir)
        .context("Maven not found. Install Maven, or use --mvn to specify the mvn executable")
}

/// Installs (or reuses) a Maven distribution and returns its `bin/mvn`.
pub fn install_maven(url: &str, sha512: Option<&str>, tools_dir: &Path) -> Result<PathBuf> {
    let url = url.strip_prefix("tgz+").unwrap_or(url);

    let local = Path::new(url);
    if local.is_dir() {
        return find_mvn_binary(local)
            .with_context(|| format!("No bin/{MVN_BINARY} under {}", local.display()));
    }

    let key = hex::encode(&Sha512::digest(url.as_bytes())[..8]);
    let install_dir = tools_dir.join("maven").join(key);
    if let Some(mvn) = find_mvn_binary(&install_dir) {
        return Ok(mvn);
    }
    fs::create_dir_all(&install_dir)
        .with_context(|| format!("Failed to create directory: {}", install_dir.display()))?;

    let archive = install_dir.join("maven.tar.gz");
    tracing::info!(url, target = %install_dir.display(), "mvn not found, downloading Maven");
    let status = Command::new("curl")
        .args(["-L", "--fail", "--silent", "--show-error", "-o"])
        .arg(&archive)
        .arg(url)
        .status()
        .context("Failed to execute curl (ensure curl is installed, or use --mvn)")?;
    if !status.success() {
        bail!("Failed to download Maven from {url}");
    }

    match sha512 {
        Some(expected) => verify_sha512(&archive, expected)?,
        None => tracing::warn!(url, "MAVEN_SHA not set, skipping checksum verification"),
    }

    let status = Command::new("tar")
        .arg("-xzf")
        .arg(&archive)
        .arg("-C")
        .arg(&install_dir)
        .status()
        .context("Failed to execute tar")?;
    if !status.success() {
        bail!("Failed to extract {}", archive.display());
    }
    let _ = fs::remove_file(&archive);

    find_mvn_binary(&install_dir)
        .with_context(|| format!("No bin/{MVN_BINARY} in the archive from {url}"))
}

pub fn verify_sha512(path: &Path, expected: &str) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let actual = hex::encode(Sha512::digest(&bytes));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        let _ = fs::remove_file(path);
        bail!(
            "Checksum mismatch for {}: expected {expected}, got {actual}",
            path.display()
        );
    }
    Ok(())
}

fn find_mvn_binary(root: &Path) -> Option<PathBuf> {
    if !root.is_dir() {
        return None;
    }
    ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .build()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .find(|p| {
            p.is_file()
                && p.file_name().is_some_and(|n| n == MVN_BINARY)
                && p.parent()
                    .and_then(|d| d.file_name())
                    .is_some_and(|d| d == "bin")
        })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "maven_stubgen_maven_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_script(path: &Path, content: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
        Ok(())
    }

    #[test]
    fn resolve_classpath_reads_mdep_output_file() -> Result<()> {
        let base = temp_dir("resolve");
        let fake_mvn = base.join("bin").join("mvn");
        let seen = base.join("seen");
        write_script(
            &fake_mvn,
            &format!(
                r#"#!/bin/sh
prev=""
out=""
for a in "$@"; do
  if [ "$prev" = "-f" ]; then cp "$a" "{seen}.pom"; fi
  case "$a" in
    -Dmdep.outputFile=*) out="${{a#-Dmdep.outputFile=}}" ;;
  esac
  prev="$a"
done
echo "$@" > "{seen}.args"
printf '/repo/demo-1.0.jar:/repo/dep-2.0.jar\n' > "$out"
"#,
                seen = seen.display()
            ),
        )?;

        let maven = Maven::new(fake_mvn, Some(base.join("m2")));
        let endpoints: Vec<Coordinate> = vec!["org.example:demo:1.0".parse()?];
        let cp = maven.resolve_classpath(&endpoints)?;
        assert_eq!(
            cp,
            vec![PathBuf::from("/repo/demo-1.0.jar"), PathBuf::from("/repo/dep-2.0.jar")]
        );

        let pom = fs::read_to_string(base.join("seen.pom"))?;
        assert!(pom.contains("<artifactId>demo</artifactId>"));
        assert!(pom.contains("<version>1.0</version>"));
        let args = fs::read_to_string(base.join("seen.args"))?;
        assert!(args.starts_with("-B -q -f "));
        assert!(args.contains(&format!("-Dmaven.repo.local={}", base.join("m2").display())));
        assert!(args.contains("dependency:build-classpath"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn resolve_classpath_surfaces_mvn_output() -> Result<()> {
        let base = temp_dir("resolve_error");
        let fake_mvn = base.join("mvn");
        write_script(
            &fake_mvn,
            "#!/bin/sh\necho \"[ERROR] Could not resolve org.example:missing\"\nexit 1\n",
        )?;

        let maven = Maven::new(fake_mvn, None);
        let err = maven
            .resolve_classpath(&["org.example:missing:1.0".parse()?])
            .unwrap_err()
            .to_string();
        assert!(err.contains("dependency:build-classpath failed"));
        assert!(err.contains("Could not resolve org.example:missing"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn fetch_sources_reports_failure_without_error() -> Result<()> {
        let base = temp_dir("sources");
        let fake_mvn = base.join("mvn");
        let args_file = base.join("args");
        write_script(
            &fake_mvn,
            &format!(
                "#!/bin/sh\necho \"$@\" > \"{}\"\nexit 1\n",
                args_file.display()
            ),
        )?;

        let maven = Maven::new(fake_mvn, None);
        assert!(!maven.fetch_sources(&"org.example:demo:1.0".parse()?));
        let args = fs::read_to_string(&args_file)?;
        assert!(args.contains("dependency:get"));
        assert!(args.contains("-Dartifact=org.example:demo:1.0:jar:sources"));
        assert!(args.contains("-Dtransitive=false"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn pom_declares_type_and_classifier() -> Result<()> {
        let pom = render_pom(&["org.example:native:jar:linux-x86_64:2.1".parse()?]);
        assert!(pom.contains("<type>jar</type>"));
        assert!(pom.contains("<classifier>linux-x86_64</classifier>"));
        assert!(pom.contains("<packaging>pom</packaging>"));
        Ok(())
    }

    #[test]
    fn ensure_mvn_prefers_explicit_then_env() -> Result<()> {
        let _guard = env_lock().lock().expect("env test lock poisoned");
        let base = temp_dir("ensure");
        let explicit = base.join("explicit-mvn");
        write_script(&explicit, "#!/bin/sh\n")?;

        assert_eq!(ensure_mvn(Some(&explicit), &base)?, explicit);
        assert!(ensure_mvn(Some(&base.join("missing")), &base).is_err());

        // SAFETY: Guarded by env_lock and removed before returning.
        unsafe { std::env::set_var("MAVEN_STUBGEN_MVN", "/opt/maven/bin/mvn") };
        let from_env = ensure_mvn(None, &base);
        // SAFETY: Guarded by env_lock.
        unsafe { std::env::remove_var("MAVEN_STUBGEN_MVN") };
        assert_eq!(from_env?, PathBuf::from("/opt/maven/bin/mvn"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn install_from_local_directory_finds_bin_mvn() -> Result<()> {
        let base = temp_dir("local_dist");
        let dist = base.join("apache-maven-3.9.9");
        write_script(&dist.join("bin").join("mvn"), "#!/bin/sh\n")?;
        fs::write(dist.join("mvn"), "not the launcher")?;

        let url = format!("tgz+{}", base.display());
        let mvn = install_maven(&url, None, &base.join("tools"))?;
        assert_eq!(mvn, dist.join("bin").join("mvn"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn checksum_mismatch_removes_download() -> Result<()> {
        let base = temp_dir("sha");
        fs::create_dir_all(&base)?;
        let file = base.join("archive.tar.gz");
        fs::write(&file, b"abc")?;

        let abc = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";
        verify_sha512(&file, abc)?;
        assert!(verify_sha512(&file, DEFAULT_MAVEN_SHA512).is_err());
        assert!(!file.exists());

        let _ = fs::remove_dir_all(base);
        Ok(())
    }
}
