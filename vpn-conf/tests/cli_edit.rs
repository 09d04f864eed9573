use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn staged_fixtures() -> TempDir {
    let dir = tempdir().expect("tempdir");
    fs::copy(fixture("fixtures/ipsec.conf"), dir.path().join("ipsec.conf")).expect("copy conf");
    fs::copy(
        fixture("fixtures/ipsec.secrets"),
        dir.path().join("ipsec.secrets"),
    )
    .expect("copy secrets");
    dir
}

fn vpn_conf(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vpn-conf"));
    cmd.env("NO_COLOR", "1")
        .arg("--conf")
        .arg(dir.join("ipsec.conf"))
        .arg("--secrets")
        .arg(dir.join("ipsec.secrets"));
    cmd
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).expect("read")
}

/// Fixtures installed as live files under `live/`, with edits staged in `work/`.
fn live_layout() -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let live = dir.path().join("live");
    fs::create_dir_all(&live).expect("mkdir");
    fs::copy(fixture("fixtures/ipsec.conf"), live.join("ipsec.conf")).expect("copy conf");
    fs::copy(fixture("fixtures/ipsec.secrets"), live.join("ipsec.secrets"))
        .expect("copy secrets");

    let settings = dir.path().join("settings.toml");
    fs::write(
        &settings,
        format!(
            "[paths]\nipsec_conf = \"{}\"\nipsec_secrets = \"{}\"\nwork_dir = \"{}\"\n",
            live.join("ipsec.conf").display(),
            live.join("ipsec.secrets").display(),
            dir.path().join("work").display()
        ),
    )
    .expect("write settings");
    (dir, settings)
}

fn vpn_conf_with_settings(settings: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vpn-conf"));
    cmd.env("NO_COLOR", "1").arg("--settings").arg(settings);
    cmd
}

#[test]
fn new_client_is_staged_with_blank_parameters() {
    let dir = tempdir().expect("tempdir");
    vpn_conf(dir.path())
        .args(["new", "office"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created office (client_psk)"))
        .stderr(predicate::str::contains(
            "connection 'office' is incomplete, missing right, rightsubnet",
        ));

    let conf = read(dir.path(), "ipsec.conf");
    assert!(conf.starts_with("conn office\n\tauto=start\n"));
    assert!(conf.contains("\tright=\n"));
}

#[test]
fn edits_go_to_the_working_copy_seeded_from_live_files() {
    let (dir, settings) = live_layout();
    let live_conf = read(dir.path(), "live/ipsec.conf");
    let live_secrets = read(dir.path(), "live/ipsec.secrets");

    vpn_conf_with_settings(&settings)
        .args(["new", "office"])
        .assert()
        .success()
        .stderr(predicate::str::contains("connection 'office' is incomplete"));
    vpn_conf_with_settings(&settings)
        .args(["set", "office", "right", "203.0.113.7"])
        .assert()
        .success();

    assert_eq!(read(dir.path(), "live/ipsec.conf"), live_conf);
    assert_eq!(read(dir.path(), "live/ipsec.secrets"), live_secrets);

    let staged = read(dir.path(), "work/ipsec.conf");
    assert!(staged.contains("conn gw_psk0\n"));
    assert!(staged.contains("conn office\n"));
    assert!(staged.contains("\tright=203.0.113.7\n"));
    assert!(read(dir.path(), "work/ipsec.secrets").starts_with("%any : PSK \"bbb\"\n"));

    vpn_conf_with_settings(&settings)
        .args(["inspect", "office"])
        .assert()
        .success()
        .stdout(predicate::str::contains("203.0.113.7"));
}

#[test]
fn incomplete_configuration_is_not_written_to_live_files() {
    let (dir, settings) = live_layout();
    let live = dir.path().join("live");
    let before = read(dir.path(), "live/ipsec.conf");

    vpn_conf_with_settings(&settings)
        .arg("--conf")
        .arg(live.join("ipsec.conf"))
        .arg("--secrets")
        .arg(live.join("ipsec.secrets"))
        .args(["new", "office"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "refusing to write an incomplete configuration to the live file",
        ));
    assert_eq!(read(dir.path(), "live/ipsec.conf"), before);

    // Complete edits may still go straight to the live files.
    vpn_conf_with_settings(&settings)
        .arg("--conf")
        .arg(live.join("ipsec.conf"))
        .arg("--secrets")
        .arg(live.join("ipsec.secrets"))
        .args(["set", "gw_psk0", "leftsubnet", "10.0.0.0/24"])
        .assert()
        .success();
    assert!(read(dir.path(), "live/ipsec.conf").contains("\tleftsubnet=10.0.0.0/24\n"));
}

#[test]
fn client_setup_flow_produces_complete_files() {
    let dir = tempdir().expect("tempdir");
    vpn_conf(dir.path()).args(["new", "office"]).assert().success();
    vpn_conf(dir.path())
        .args(["set", "office", "right", "203.0.113.7"])
        .assert()
        .success();
    vpn_conf(dir.path())
        .args(["set", "office", "rightsubnet", "10.1.0.0/16"])
        .assert()
        .success()
        .stderr(predicate::str::contains("incomplete").not());
    vpn_conf(dir.path())
        .args(["client-psk", "203.0.113.7", "s3cret"])
        .assert()
        .success();

    let conf = read(dir.path(), "ipsec.conf");
    assert!(conf.contains("\tright=203.0.113.7\n"));
    assert!(conf.contains("\trightsubnet=10.1.0.0/16\n"));
    assert_eq!(
        read(dir.path(), "ipsec.secrets"),
        "203.0.113.7 : PSK \"s3cret\"\n"
    );
}

#[test]
fn editing_drops_unsupported_content() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["set", "gw_psk0", "leftsubnet", "10.0.0.0/24"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "unsupported section 'config setup' will be dropped",
        ));

    let conf = read(dir.path(), "ipsec.conf");
    assert!(conf.starts_with("conn gw_psk0\n"));
    assert!(conf.contains("\tleftsubnet=10.0.0.0/24\n"));
    assert!(!conf.contains("conn l2tp"));
    assert!(!conf.contains("config setup"));

    let secrets = read(dir.path(), "ipsec.secrets");
    assert!(secrets.starts_with("%any : PSK \"bbb\"\n"));
    assert!(!secrets.contains("PIN"));
}

#[test]
fn changing_right_moves_the_client_secret() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["set", "client_psk4", "right", "10.0.0.9"])
        .assert()
        .success();

    let secrets = read(dir.path(), "ipsec.secrets");
    assert!(secrets.contains("10.0.0.9 : PSK \"ddd\"\n"));
    assert!(!secrets.contains("192.168.122.123"));
}

#[test]
fn client_right_rejects_gateway_identities() {
    let dir = staged_fixtures();
    let secrets = read(dir.path(), "ipsec.secrets");

    for value in ["", "%any"] {
        vpn_conf(dir.path())
            .args(["set", "client_psk4", "right", value])
            .assert()
            .failure()
            .stderr(predicate::str::contains("is not a remote gateway"));
    }
    vpn_conf(dir.path())
        .args(["client-psk", "%any", "leak"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a remote gateway"));

    assert_eq!(read(dir.path(), "ipsec.secrets"), secrets);
    assert!(read(dir.path(), "ipsec.conf").contains("\tright=192.168.122.123\n"));
}

#[test]
fn set_accepts_only_parameters_the_scenario_keeps() {
    let dir = staged_fixtures();
    let before = read(dir.path(), "ipsec.conf");

    vpn_conf(dir.path())
        .args(["set", "client_psk4", "leftcert", "/c.pem"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "cannot change 'leftcert' on client_psk4: client_psk connections take right, rightsubnet",
        ));
    vpn_conf(dir.path())
        .args(["set", "client_psk4", "compress", "yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot change 'compress'"));
    vpn_conf(dir.path())
        .args(["unset", "gw_psk0", "auto"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot change 'auto' on gw_psk0"));

    assert_eq!(read(dir.path(), "ipsec.conf"), before);
}

#[cfg(unix)]
#[test]
fn edited_secrets_stay_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = staged_fixtures();
    let secrets = dir.path().join("ipsec.secrets");
    fs::set_permissions(&secrets, fs::Permissions::from_mode(0o644)).expect("chmod");

    vpn_conf(dir.path())
        .args(["client-psk", "192.168.122.123", "rotated"])
        .assert()
        .success();

    assert!(read(dir.path(), "ipsec.secrets").contains("192.168.122.123 : PSK \"rotated\"\n"));
    let mode = fs::metadata(&secrets).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn new_gateway_fails_when_every_slot_is_taken() {
    let dir = staged_fixtures();
    let before = read(dir.path(), "ipsec.conf");
    vpn_conf(dir.path())
        .args(["new", "gw5", "--role", "gateway"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("all gateway scenarios are already used"));
    assert_eq!(read(dir.path(), "ipsec.conf"), before);
}

#[test]
fn new_connection_rejects_bad_and_duplicate_names() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["new", "9lives"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid connection name '9lives'"));
    vpn_conf(dir.path())
        .args(["new", "client_psk4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "the connection name 'client_psk4' is already used",
        ));
}

#[test]
fn scenario_change_respects_gateway_slots() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["scenario", "client_psk4", "gw_psk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "scenario gw_psk is already configured by gateway 'gw_psk0'",
        ));

    vpn_conf(dir.path())
        .args(["scenario", "client_psk4", "client_cert"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client_psk4: scenario client_cert"))
        .stderr(predicate::str::contains("client_psk4' is incomplete"));
}

#[test]
fn role_change_to_client_uses_client_psk() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["role", "gw_win3", "client"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gw_win3: scenario client_psk"));
    vpn_conf(dir.path())
        .args(["new", "gw9", "--role", "gateway"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created gw9 (gw_win)"));
}

#[test]
fn delete_removes_connection_and_its_secret() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["delete", "client_cert5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted client_cert5"));

    assert!(!read(dir.path(), "ipsec.conf").contains("conn client_cert5"));
    assert!(!read(dir.path(), "ipsec.secrets").contains("/key5.pem"));

    vpn_conf(dir.path())
        .args(["delete", "client_cert5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no connection named 'client_cert5'"));
}

#[test]
fn gateway_credentials_are_written() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["gateway-psk", "n3w"])
        .assert()
        .success();
    vpn_conf(dir.path())
        .args(["gateway-cert", "/etc/ipsec.d/certs/gw.pem", "/etc/ipsec.d/private/gw.key"])
        .assert()
        .success();

    let secrets = read(dir.path(), "ipsec.secrets");
    assert!(secrets.contains("%any : PSK \"n3w\"\n"));
    assert!(secrets.contains("%any : RSA /etc/ipsec.d/private/gw.key\n"));
    let conf = read(dir.path(), "ipsec.conf");
    assert!(conf.contains("\tleftcert=/etc/ipsec.d/certs/gw.pem\n"));
}

#[test]
fn client_cert_needs_a_matching_connection() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["client-cert", "192.168.122.124", "/c.pem", "/k.pem"])
        .assert()
        .success();
    assert!(read(dir.path(), "ipsec.secrets").contains("192.168.122.124 : RSA /k.pem\n"));
    assert!(read(dir.path(), "ipsec.conf").contains("\tleftcert=/c.pem\n"));

    vpn_conf(dir.path())
        .args(["client-cert", "198.51.100.1", "/c.pem", "/k.pem"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "cannot find a client certificate connection to gateway '198.51.100.1'",
        ));
}

#[test]
fn users_are_added_and_removed() {
    let dir = staged_fixtures();
    vpn_conf(dir.path())
        .args(["user", "add", "xauth", "alice", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added xauth user alice"));
    assert!(read(dir.path(), "ipsec.secrets").contains("alice : XAUTH \"pw\"\n"));

    vpn_conf(dir.path())
        .args(["user", "add", "xauth", "alice", "other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xauth user 'alice' already exists"));
    vpn_conf(dir.path())
        .args(["user", "add", "eap", "bob", ""])
        .assert()
        .failure()
        .stderr(predicate::str::contains("password must not be empty"));

    vpn_conf(dir.path())
        .args(["user", "del", "eap", "user4"])
        .assert()
        .success();
    assert!(!read(dir.path(), "ipsec.secrets").contains("user4 : EAP"));
    vpn_conf(dir.path())
        .args(["user", "del", "eap", "user4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no eap user named 'user4'"));
}
