#![cfg(unix)]

mod common;

use common::*;
use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn run(args: &[&str]) -> anyhow::Result<Output> {
    let out = Command::new(env!("CARGO_BIN_EXE_maven-stubgen"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()?;
    Ok(out)
}

fn run_json(args: &[&str]) -> anyhow::Result<Value> {
    let out = run(args)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

/// `org.example.demo.Greeter` and `org.example.demo.util.Strings`, with a
/// sources jar documenting the greeter.
fn demo_repository(m2: &Path) -> anyhow::Result<std::path::PathBuf> {
    let dir = m2.join("org/example/demo/1.0");
    let jar = dir.join("demo-1.0.jar");

    let greeter = class_file(
        ACC_PUBLIC | ACC_SUPER,
        "org/example/demo/Greeter",
        &[Member::new(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "VERSION", "I")],
        &[
            Member::new(ACC_PUBLIC, "<init>", "()V"),
            Member::new(ACC_PUBLIC, "greet", "(Ljava/lang/String;)Ljava/lang/String;")
                .params(&["name"]),
        ],
    );
    let strings = class_file(
        ACC_PUBLIC | ACC_FINAL | ACC_SUPER,
        "org/example/demo/util/Strings",
        &[],
        &[
            Member::new(ACC_PUBLIC | ACC_STATIC, "upper", "(Ljava/lang/String;)Ljava/lang/String;")
                .params(&["s"]),
            Member::new(ACC_PUBLIC | ACC_STATIC, "upper", "([C)Ljava/lang/String;")
                .params(&["chars"]),
        ],
    );
    let hidden = class_file(0x0020, "org/example/demo/Hidden", &[], &[]);
    write_jar(
        &jar,
        &[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            ("org/example/demo/Greeter.class", greeter.as_slice()),
            ("org/example/demo/Hidden.class", hidden.as_slice()),
            ("org/example/demo/util/Strings.class", strings.as_slice()),
        ],
    )?;

    let source = br#"package org.example.demo;

/** Says hello. */
public class Greeter {
    /** Greets {@code name}. */
    public String greet(String name) {
        return "Hello " + name;
    }
}
"#;
    write_jar(
        &dir.join("demo-1.0-sources.jar"),
        &[("org/example/demo/Greeter.java", source.as_slice())],
    )?;
    Ok(jar)
}

#[test]
fn generate_writes_stubs_shims_and_protocols() -> anyhow::Result<()> {
    let base = temp_dir("generate");
    let jar = demo_repository(&base.join("m2"))?;
    let dep = base.join("m2/org/other/lib/2.0/lib-2.0.jar");
    write_jar(
        &dep,
        &[(
            "org/other/Lib.class",
            class_file(ACC_PUBLIC | ACC_SUPER, "org/other/Lib", &[], &[]).as_slice(),
        )],
    )?;
    let mvn = base.join("bin/mvn");
    fake_mvn(&mvn, &[jar.as_path(), dep.as_path()])?;

    let out_dir = base.join("out");
    let db = base.join("cache.lmdb");
    let args = [
        "--mvn",
        mvn.to_str().unwrap(),
        "--db",
        db.to_str().unwrap(),
        "org.example:demo:1.0",
        "--output-dir",
        out_dir.to_str().unwrap(),
        "--no-format",
    ];
    let report = run_json(&args)?;
    assert_eq!(report["prefixes"], serde_json::json!(["org.example.demo"]));
    assert_eq!(report["classpath_jars"], 2);
    assert_eq!(report["stubs_written"], 2);
    assert_eq!(report["runtime_modules_written"], 2);
    assert_eq!(report["classes"], 2);

    let demo = std::fs::read_to_string(out_dir.join("org/example/demo/__init__.pyi"))?;
    assert!(demo.contains("import java.lang\n"));
    assert!(demo.contains("import org.example.demo.util\n"));
    assert!(demo.contains("class Greeter(java.lang.Object):\n    \"\"\"Says hello.\"\"\"\n"));
    assert!(demo.contains("    VERSION: typing.ClassVar[int] = ...\n"));
    assert!(demo.contains("    def __init__(self): ...\n"));
    assert!(demo.contains(
        "    def greet(self, name: typing.Union[java.lang.String, str]) -> java.lang.String:\n        \"\"\"Greets ``name``.\"\"\"\n        ...\n"
    ));
    assert!(!demo.contains("Hidden"));
    assert!(demo.contains("    Greeter: typing.Type[Greeter]\n"));
    assert!(demo.contains("    util: org.example.demo.util.__module_protocol__\n"));

    let util = std::fs::read_to_string(out_dir.join("org/example/demo/util/__init__.pyi"))?;
    assert!(util.contains("import jpype\n"));
    assert!(util.contains(
        "    @typing.overload\n    @staticmethod\n    def upper(chars: typing.Union[typing.List[str], jpype.JArray]) -> java.lang.String: ...\n"
    ));
    assert!(util.contains(
        "    @typing.overload\n    @staticmethod\n    def upper(s: typing.Union[java.lang.String, str]) -> java.lang.String: ...\n"
    ));

    let shim = std::fs::read_to_string(out_dir.join("org/example/demo/__init__.py"))?;
    assert_eq!(
        shim,
        "from scyjava_stubs import dynamic_import\n\n__all__, __getattr__ = dynamic_import(__name__, __file__, 'org.example:demo:1.0')\n"
    );
    assert!(!out_dir.join("org/other").exists());

    // the second run is served from the cache
    let again = run_json(&args)?;
    assert_eq!(again["classes"], 2);
    let stats = run_json(&["--db", db.to_str().unwrap(), "stats"])?;
    assert_eq!(stats["jar_models"], 2);
    assert_eq!(stats["source_docs"], 1);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn namespace_only_stubs_are_removed_on_request() -> anyhow::Result<()> {
    let base = temp_dir("namespace");
    let jar = demo_repository(&base.join("m2"))?;
    let mvn = base.join("bin/mvn");
    fake_mvn(&mvn, &[jar.as_path()])?;

    let out_dir = base.join("out");
    let stale = out_dir.join("org/example/__init__.pyi");
    write_file(&stale, "# stale\n")?;

    let report = run_json(&[
        "--mvn",
        mvn.to_str().unwrap(),
        "generate",
        "org.example:demo:1.0",
        "--prefix",
        "org.example",
        "-o",
        out_dir.to_str().unwrap(),
        "--remove-namespace-only-stubs",
        "--no-runtime-imports",
        "--no-javadoc",
        "--convert-strings",
        "--no-format",
        "--no-cache",
    ])?;
    assert_eq!(report["prefixes"], serde_json::json!(["org.example"]));
    assert_eq!(report["namespace_stubs_removed"], 1);
    assert_eq!(report["runtime_modules_written"], 0);
    assert!(!stale.exists());
    assert!(!out_dir.join("org/example/demo/__init__.py").exists());

    let demo = std::fs::read_to_string(out_dir.join("org/example/demo/__init__.pyi"))?;
    assert!(demo.contains("    def greet(self, name: typing.Union[java.lang.String, str]) -> str: ...\n"));
    assert!(!demo.contains("Says hello."));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn resolution_failure_reports_mvn_output() -> anyhow::Result<()> {
    let base = temp_dir("mvn_failure");
    let mvn = base.join("bin/mvn");
    write_file(
        &mvn,
        "#!/bin/sh\necho \"[ERROR] Failed to collect dependencies for org.example:missing:1.0\"\nexit 1\n",
    )?;
    make_executable(&mvn)?;

    let out = run(&[
        "--mvn",
        mvn.to_str().unwrap(),
        "org.example:missing:1.0",
        "-o",
        base.join("out").to_str().unwrap(),
        "--no-cache",
    ])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Failed to collect dependencies"));

    let bad = run(&["--mvn", mvn.to_str().unwrap(), "not-a-coordinate", "--no-cache"])?;
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("Invalid endpoint"));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn packages_lists_top_level_packages() -> anyhow::Result<()> {
    let base = temp_dir("packages");
    let jar = demo_repository(&base.join("m2"))?;
    let report = run_json(&["packages", jar.to_str().unwrap()])?;
    assert_eq!(report["packages"], serde_json::json!(["org.example.demo"]));
    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn build_regenerates_project_stubs() -> anyhow::Result<()> {
    let base = temp_dir("build");
    let jar = demo_repository(&base.join("m2"))?;
    let mvn = base.join("bin/mvn");
    fake_mvn(&mvn, &[jar.as_path()])?;

    let project = base.join("demo-stubs");
    write_file(
        &project.join("pyproject.toml"),
        r#"[project]
name = "demo-stubs"
version = "1.0"

[tool.maven-stubgen]
maven_coord = "org.example:demo"
prefixes = ["org.example.demo.util"]
"#,
    )?;
    let leftover = project.join("src/old/__init__.pyi");
    write_file(&leftover, "")?;

    let report = run_json(&[
        "--mvn",
        mvn.to_str().unwrap(),
        "--db",
        base.join("cache.lmdb").to_str().unwrap(),
        "build",
        "--project",
        project.to_str().unwrap(),
    ])?;
    assert_eq!(report["endpoint"], "org.example:demo:1.0");
    assert_eq!(report["packages"], serde_json::json!(["src/org"]));
    assert_eq!(report["generate"]["stubs_written"], 1);
    assert!(!leftover.exists());

    let util = std::fs::read_to_string(project.join("src/org/example/demo/util/__init__.pyi"))?;
    assert!(util.contains("-> str: ..."));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn build_refuses_output_dir_outside_the_project() -> anyhow::Result<()> {
    let base = temp_dir("build_guard");
    let mvn = base.join("bin/mvn");
    write_file(&mvn, "#!/bin/sh\necho \"[ERROR] offline\"\nexit 1\n")?;
    make_executable(&mvn)?;

    for output_dir in [".", "..", "/"] {
        let project = base.join("proj");
        write_file(
            &project.join("pyproject.toml"),
            &format!(
                "[project]\nname = \"proj\"\nversion = \"1.0\"\n\n[tool.maven-stubgen]\nmaven_coord = \"org.example:demo\"\noutput_dir = \"{output_dir}\"\n"
            ),
        )?;
        write_file(&project.join("README.md"), "keep me\n")?;

        let out = run(&[
            "--mvn",
            mvn.to_str().unwrap(),
            "--db",
            base.join("cache.lmdb").to_str().unwrap(),
            "build",
            "--project",
            project.to_str().unwrap(),
        ])?;
        assert!(!out.status.success());
        assert!(
            String::from_utf8_lossy(&out.stderr).contains("must be a subdirectory"),
            "{}",
            String::from_utf8_lossy(&out.stderr)
        );
        assert!(project.join("pyproject.toml").exists());
        assert!(project.join("README.md").exists());
    }

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
