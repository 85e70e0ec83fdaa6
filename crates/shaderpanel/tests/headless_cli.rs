use std::fs;
use std::process::Command;

use tempfile::TempDir;

const VERTEX: &str = "#version 300 es\nin vec4 a_position;\nin vec2 a_texcoord;\nout vec2 v_texcoord;\nvoid main() {\n  gl_Position = a_position;\n  v_texcoord = a_texcoord;\n}\n";
const FRAGMENT: &str = "#version 300 es\nprecision highp float;\nuniform float time;\nuniform float ratio;\nuniform sampler2D tex;\nin vec2 v_texcoord;\nout vec4 color;\nvoid main() {\n  color = texture(tex, v_texcoord) * vec4(ratio, time, 1.0, 1.0);\n}\n";

fn shaderpanel() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shaderpanel"));
    command.env("RUST_LOG", "warn");
    command
}

#[test]
fn variants_lists_every_builtin() {
    let output = shaderpanel()
        .arg("variants")
        .output()
        .expect("failed to run shaderpanel variants");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["fancy", "bouncy", "plasma", "noise", "grain"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    assert!(stdout.contains("texture=repeat"));
}

#[test]
fn check_builds_the_fancy_shader_by_default() {
    let output = shaderpanel()
        .arg("check")
        .output()
        .expect("failed to run shaderpanel check");
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ok: fancy (texture=none"), "{stdout}");
}

#[test]
fn run_with_migrations_reports_balanced_accounting() {
    let output = shaderpanel()
        .args([
            "run",
            "--variant",
            "noise",
            "--frames",
            "12",
            "--fps",
            "240",
            "--migrate-every",
            "4",
            "--size",
            "320x200",
        ])
        .output()
        .expect("failed to run shaderpanel run");
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shader:          noise"), "{stdout}");
    assert!(stdout.contains("live=0"), "{stdout}");
    assert!(stdout.contains("failed=0 migrations="), "{stdout}");
}

#[test]
fn run_reads_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("shaderpanel.toml");
    fs::write(
        &config,
        r#"
version = 1

[panel]
variant = "grain"
render_scale = 1.5

[headless]
width = 64
height = 48
fps = 200
duration = "150ms"

[[headless.scale_changes]]
at = "0s"
scale = 2.0
"#,
    )
    .unwrap();

    let output = shaderpanel()
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run shaderpanel with config");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shader:          grain"), "{stdout}");
    assert!(stdout.contains("final scale:     2"), "{stdout}");
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "version = 1\n[headless]\nfps = 0\n").unwrap();

    let output = shaderpanel()
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run shaderpanel with invalid config");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("headless.fps"));
}

#[test]
fn check_accepts_custom_shaders_and_rejects_broken_ones() {
    let dir = TempDir::new().unwrap();
    let vertex = dir.path().join("quad.vert");
    let fragment = dir.path().join("tinted.frag");
    let broken = dir.path().join("broken.frag");
    fs::write(&vertex, VERTEX).unwrap();
    fs::write(&fragment, FRAGMENT).unwrap();
    fs::write(&broken, "#version 300 es\nvoid main() {\n  color = vec4(1.0));\n}\n").unwrap();

    let ok = shaderpanel()
        .arg("check")
        .arg("--vertex")
        .arg(&vertex)
        .arg("--fragment")
        .arg(&fragment)
        .args(["--texture", "repeat"])
        .output()
        .expect("failed to run shaderpanel check");
    assert!(
        ok.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&ok.stderr)
    );
    assert!(String::from_utf8_lossy(&ok.stdout).contains("ok: tinted (texture=repeat"));

    let failed = shaderpanel()
        .arg("check")
        .arg("--vertex")
        .arg(&vertex)
        .arg("--fragment")
        .arg(&broken)
        .output()
        .expect("failed to run shaderpanel check on broken shader");
    assert!(!failed.status.success());
    let stderr = String::from_utf8_lossy(&failed.stderr);
    assert!(stderr.contains("failed to compile fragment shader"), "{stderr}");
    assert!(stderr.contains("0:3"), "{stderr}");
}

#[test]
fn broken_shader_run_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    let vertex = dir.path().join("quad.vert");
    let broken = dir.path().join("broken.frag");
    fs::write(&vertex, VERTEX).unwrap();
    fs::write(&broken, "#error unfinished\n").unwrap();

    let output = shaderpanel()
        .arg("--vertex")
        .arg(&vertex)
        .arg("--fragment")
        .arg(&broken)
        .args(["--frames", "3", "--fps", "200"])
        .output()
        .expect("failed to run shaderpanel with broken shader");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("live=0"));
}
