use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::{PathBuf,Path};
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const SAMPLE: &str = "Who's there?
Nay, answer me. Stand and unfold yourself.
Long live the King!
Bernardo?
He.
You come most carefully upon your hour.
'Tis now struck twelve. Get thee to bed, Francisco.
For this relief much thanks. 'Tis bitter cold,
And I am sick at heart.
";

fn write_input(temp_dir: &tempfile::TempDir,name: &str,dat: &[u8]) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let path = temp_dir.path().join(name);
    std::fs::write(&path,dat)?;
    Ok(path)
}

fn compress_file(in_path: &Path,out_path: &Path) -> STDRESULT {
    let mut cmd = Command::cargo_bin("adahuff")?;
    cmd.arg("-i").arg(in_path)
        .arg("-o").arg(out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("compressed"));
    Ok(())
}

fn expand_file(in_path: &Path,out_path: &Path) -> STDRESULT {
    let mut cmd = Command::cargo_bin("adahuff")?;
    cmd.arg("-d")
        .arg("-i").arg(in_path)
        .arg("-o").arg(out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("expanded"));
    Ok(())
}

fn round_trip(dat: &[u8]) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_input(&temp_dir,"original.bin",dat)?;
    let cmp_path = temp_dir.path().join("compressed.ahf");
    let out_path = temp_dir.path().join("expanded.bin");
    compress_file(&in_path,&cmp_path)?;
    expand_file(&cmp_path,&out_path)?;
    match (std::fs::read(in_path),std::fs::read(out_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare output with reference")
    }
    Ok(())
}

#[test]
fn text_round_trip() -> STDRESULT {
    round_trip(SAMPLE.as_bytes())
}

#[test]
fn binary_round_trip() -> STDRESULT {
    let dat: Vec<u8> = (0..4096u32).map(|i| ((i*i) % 251) as u8).collect();
    round_trip(&dat)
}

#[test]
fn empty_file() -> STDRESULT {
    round_trip(&[])
}

#[test]
fn known_output() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_input(&temp_dir,"aaa.txt","AAA".as_bytes())?;
    let out_path = temp_dir.path().join("aaa.ahf");
    let mut cmd = Command::cargo_bin("adahuff")?;
    cmd.arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("compressed 3 into 2"));
    assert_eq!(std::fs::read(out_path)?,vec![0x20,0xe2]);
    Ok(())
}

#[test]
fn text_shrinks() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_input(&temp_dir,"sample.txt",SAMPLE.as_bytes())?;
    let out_path = temp_dir.path().join("sample.ahf");
    compress_file(&in_path,&out_path)?;
    let compressed = std::fs::read(out_path)?;
    assert!(compressed.len() < SAMPLE.len());
    Ok(())
}

#[test]
fn truncated_input_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    // first bit selects NEW, then the literal is cut short
    let in_path = write_input(&temp_dir,"cut.ahf",&[0x20])?;
    let out_path = temp_dir.path().join("cut.txt");
    let mut cmd = Command::cargo_bin("adahuff")?;
    cmd.arg("-d")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Truncated"));
    Ok(())
}

#[test]
fn missing_input_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("nothing_here.txt");
    let out_path = temp_dir.path().join("nothing_here.ahf");
    let mut cmd = Command::cargo_bin("adahuff")?;
    cmd.arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure();
    Ok(())
}
