//! Command-line behavior: exit codes, diagnostics and stdout formats.

mod common;

use std::fs;

use assert_cmd::Command;
use common::{Workspace, SIGNER_NICKNAME};
use predicates::prelude::*;

fn pesign(ws: &Workspace) -> Command {
    let mut cmd = Command::cargo_bin("pesign").unwrap();
    cmd.env("XDG_CONFIG_HOME", ws.dir.path())
        .env_remove("RUST_LOG")
        .current_dir(ws.dir.path());
    cmd
}

#[test]
fn help_lists_options() {
    let ws = Workspace::new();
    pesign(&ws)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--export-signed-attributes"))
        .stdout(predicate::str::contains("--omit-vendor-cert"));
}

#[test]
fn no_action_is_an_error() {
    let ws = Workspace::new();
    pesign(&ws)
        .arg("-i")
        .arg(ws.input())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("pesign: Nothing to do."));
}

#[test]
fn hash_prints_path_and_hex_digest() {
    let ws = Workspace::new();
    let pattern = format!(
        "^{} [0-9a-f]{{64}}\n$",
        regex_escape(&ws.input().display().to_string())
    );
    pesign(&ws)
        .arg("-i")
        .arg(ws.input())
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::is_match(pattern).unwrap());

    pesign(&ws)
        .args(["-d", "sha384", "-h", "-O", "-i"])
        .arg(ws.input())
        .assert()
        .success()
        .stdout(predicate::str::is_match(" [0-9a-f]{96}\n$").unwrap());
}

#[test]
fn unknown_digest_exits_with_failure() {
    let ws = Workspace::new();
    pesign(&ws)
        .args(["-d", "md5", "-h", "-i"])
        .arg(ws.input())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown digest type"));
}

#[test]
fn incompatible_flags_name_both_actions() {
    let ws = Workspace::new();
    pesign(&ws)
        .arg("-i")
        .arg(ws.input())
        .arg("-o")
        .arg(ws.path("out.efi"))
        .args(["-c", SIGNER_NICKNAME, "-n"])
        .arg(ws.certdir())
        .arg("-K")
        .arg(ws.path("key.der"))
        .arg("-r")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Incompatible flags"))
        .stderr(predicate::str::contains("EXPORT_PUBKEY"))
        .stderr(predicate::str::contains("REMOVE_SIGNATURE"));
}

#[test]
fn sign_list_and_remove() {
    let ws = Workspace::new();
    let signed = ws.path("signed.efi");
    pesign(&ws)
        .arg("-i")
        .arg(ws.input())
        .arg("-o")
        .arg(&signed)
        .args(["-c", SIGNER_NICKNAME, "-n"])
        .arg(ws.certdir())
        .arg("-s")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    pesign(&ws)
        .arg("-i")
        .arg(&signed)
        .arg("-S")
        .assert()
        .success()
        .stdout(predicate::str::contains("signature 0:"))
        .stdout(predicate::str::contains("Test Signer"));

    pesign(&ws)
        .arg("-i")
        .arg(&signed)
        .arg("-o")
        .arg(ws.path("bad.efi"))
        .args(["-r", "-u", "3"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Invalid signature number 3. Must be between 0 and 0.",
        ));

    pesign(&ws)
        .arg("-i")
        .arg(&signed)
        .arg("-o")
        .arg(ws.path("unsigned.efi"))
        .args(["-r", "-u", "0"])
        .assert()
        .success();

    pesign(&ws)
        .arg("-i")
        .arg(ws.path("unsigned.efi"))
        .arg("-S")
        .assert()
        .success()
        .stdout("No signatures found.\n");
}

#[test]
fn same_input_and_output_is_rejected() {
    let ws = Workspace::new();
    let before = fs::read(ws.input()).unwrap();
    pesign(&ws)
        .arg("-i")
        .arg(ws.input())
        .arg("-o")
        .arg(ws.input())
        .args(["-c", SIGNER_NICKNAME, "-n"])
        .arg(ws.certdir())
        .arg("-s")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("in-place file editing"));
    assert_eq!(fs::read(ws.input()).unwrap(), before);
}

#[test]
fn configuration_supplies_certificate_defaults() {
    let ws = Workspace::new();
    let config = ws.path("pesign.toml");
    fs::write(
        &config,
        format!(
            "certificate_directory = {:?}\ndefault_certificate = \"{SIGNER_NICKNAME}\"\nascii_armor = true\n",
            ws.certdir().display().to_string()
        ),
    )
    .unwrap();

    let exported = ws.path("signer.pem");
    pesign(&ws)
        .arg("--config")
        .arg(&config)
        .arg("-C")
        .arg(&exported)
        .assert()
        .success();
    let pem = fs::read_to_string(&exported).unwrap();
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
}

#[test]
fn missing_configuration_file_is_an_error() {
    let ws = Workspace::new();
    pesign(&ws)
        .arg("--config")
        .arg(ws.path("absent.toml"))
        .arg("-i")
        .arg(ws.input())
        .arg("-h")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("pesign: Configuration error"));
}

fn regex_escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            if c.is_ascii_alphanumeric() || c == '/' || c == '_' || c == '-' {
                vec![c]
            } else {
                vec!['\\', c]
            }
        })
        .collect()
}
