use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

const ADDRESS: &str = "0:2cf55953e92efbeadab7ba725c3f93a0b23f842cbba72d7b8e6f510a70e422e3";

fn deployer(project: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("deployer"));
    cmd.env("RUST_LOG", "warn")
        .env_remove("WALLET_MNEMONIC")
        .env_remove("WALLET_VERSION")
        .arg("--project")
        .arg(project);
    cmd
}

#[test]
fn links_are_built_without_network_access() {
    let tmp = tempdir().expect("tempdir");

    deployer(tmp.path())
        .args(["--testnet", "--tonviewer", "links", "--address", ADDRESS, "--tx"])
        .arg("ab".repeat(32))
        .assert()
        .success()
        .stdout(contains("https://testnet.tonviewer.com/kQ"))
        .stdout(contains(format!(
            "https://testnet.tonviewer.com/transaction/{}",
            "ab".repeat(32)
        )));
}

#[test]
fn explorer_can_come_from_project_config() {
    let tmp = tempdir().expect("tempdir");
    std::fs::write(
        tmp.path().join("deployer.toml"),
        "network = \"mainnet\"\nexplorer = \"tonscan\"\n",
    )
    .expect("write config");

    deployer(tmp.path())
        .args(["links", "--address", ADDRESS])
        .assert()
        .success()
        .stdout(contains("https://tonscan.org/address/EQ"));
}

#[test]
fn conflicting_network_flags_name_every_option() {
    let tmp = tempdir().expect("tempdir");

    deployer(tmp.path())
        .args(["--mainnet", "--testnet", "links", "--address", ADDRESS])
        .assert()
        .failure()
        .stderr(contains("--mainnet, --testnet"));
}

#[test]
fn v4_with_api_key_is_a_configuration_error() {
    let tmp = tempdir().expect("tempdir");

    deployer(tmp.path())
        .args([
            "--custom",
            "http://127.0.0.1:9",
            "--custom-version",
            "v4",
            "--custom-key",
            "secret",
            "links",
            "--address",
            ADDRESS,
        ])
        .assert()
        .failure()
        .stderr(contains("the v4 API does not accept an API key"));
}

#[test]
fn mnemonic_signer_requires_environment() {
    let tmp = tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("code.bin"), b"code").expect("code");
    std::fs::write(tmp.path().join("data.bin"), b"data").expect("data");

    deployer(tmp.path())
        .current_dir(tmp.path())
        .args([
            "--custom",
            "http://127.0.0.1:9",
            "--tonscan",
            "deploy",
            "--mnemonic",
            "--code",
            "code.bin",
            "--data",
            "data.bin",
        ])
        .assert()
        .failure()
        .stderr(contains("WALLET_MNEMONIC"));
}

#[test]
fn malformed_dotenv_is_reported() {
    let tmp = tempdir().expect("tempdir");
    std::fs::write(tmp.path().join(".env"), "this is not a dotenv line\n").expect("write .env");

    deployer(tmp.path())
        .current_dir(tmp.path())
        .args(["--testnet", "links", "--address", ADDRESS])
        .assert()
        .failure()
        .stderr(contains("could not load .env file"));
}
