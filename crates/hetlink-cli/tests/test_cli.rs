use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn synth(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("hetlink")?
        .arg("synth")
        .arg("-o")
        .arg(path)
        .arg("--nodes")
        .arg("30,24")
        .arg("--seed")
        .arg("7")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 node types, 4 relations"));
    Ok(())
}

#[test]
fn test_cli_synth_and_stats() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let graph = dir.path().join("graph.json");
    synth(&graph)?;
    assert!(graph.exists());

    Command::cargo_bin("hetlink")?
        .arg("stats")
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("Node types:     2"))
        .stdout(predicate::str::contains("Relation types: 4"))
        .stdout(predicate::str::contains("Node type 00: 30 nodes"))
        .stdout(predicate::str::contains("[01, 00, 00] 24x30"));
    Ok(())
}

#[test]
fn test_cli_stats_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let graph = dir.path().join("graph.json");
    synth(&graph)?;

    let out = Command::cargo_bin("hetlink")?
        .arg("stats")
        .arg(&graph)
        .arg("--json")
        .output()?;
    assert!(out.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(stats["node_types"].as_array().map(Vec::len), Some(2));
    assert_eq!(stats["relations"].as_array().map(Vec::len), Some(4));
    Ok(())
}

#[test]
fn test_cli_train_report_and_evaluate() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let graph = dir.path().join("graph.json");
    let runs = dir.path().join("runs");
    let report = dir.path().join("report.json");
    synth(&graph)?;

    Command::cargo_bin("hetlink")?
        .arg("train")
        .arg(&graph)
        .args(["--epochs", "2", "--hidden1", "8", "--hidden2", "4"])
        .args(["--batch-size", "64", "--held-out", "0.2"])
        .args(["--relation", "0,1,0", "--relation", "1,1,0"])
        .arg("--checkpoint-dir")
        .arg(&runs)
        .args(["--checkpoint-every", "2"])
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Epoch: 0002"))
        .stdout(predicate::str::contains("Edge type=[00, 01, 00] AUROC="))
        .stdout(predicate::str::contains("Edge type=[01, 01, 00] AUROC="));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report)?)?;
    assert_eq!(json["epochs"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["test"].as_array().map(Vec::len), Some(2));
    assert!(runs.join("ep2").join("model.safetensors").exists());

    Command::cargo_bin("hetlink")?
        .arg("evaluate")
        .arg(&graph)
        .arg("--checkpoint")
        .arg(runs.join("ep2"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkpoint epoch 2 (test split)"))
        .stdout(predicate::str::contains("Edge type=[01, 01, 00]"));
    Ok(())
}

#[test]
fn test_cli_config_file_with_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let graph = dir.path().join("graph.json");
    let config = dir.path().join("config.json");
    synth(&graph)?;
    fs::write(
        &config,
        r#"{"epochs": 3, "hidden1": 8, "hidden2": 4, "loss": "cross_entropy", "track_held_out_cost": false}"#,
    )?;

    Command::cargo_bin("hetlink")?
        .arg("train")
        .arg(&graph)
        .arg("--config")
        .arg(&config)
        .args(["--epochs", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Epoch: 0001"))
        .stdout(predicate::str::contains("Epoch: 0002").not())
        .stdout(predicate::str::contains("val_loss=-"));
    Ok(())
}

#[test]
fn test_cli_rejects_bad_input() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let graph = dir.path().join("graph.json");
    synth(&graph)?;

    Command::cargo_bin("hetlink")?
        .arg("train")
        .arg(&graph)
        .args(["--relation", "0,1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected row,col,index"));

    Command::cargo_bin("hetlink")?
        .arg("train")
        .arg(&graph)
        .args(["--relation", "0,1,5"])
        .assert()
        .failure();

    Command::cargo_bin("hetlink")?
        .arg("train")
        .arg(&graph)
        .args(["--dropout", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dropout"));

    Command::cargo_bin("hetlink")?
        .arg("stats")
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load graph"));
    Ok(())
}
