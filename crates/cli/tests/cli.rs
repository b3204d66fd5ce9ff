use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

fn scratch_socket(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("vmprobe-cli-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    dir.join(format!("{}-{}.sock", prefix, nonce))
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_vmprobe"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("VMProbe"));
}

#[test]
fn test_cli_missing_socket_path() {
    let output = Command::new(env!("CARGO_BIN_EXE_vmprobe"))
        .args(["-p", "/tmp/vmprobe-definitely-missing.sock"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_cli_rejects_non_socket_path() {
    let mut dir = std::env::temp_dir();
    dir.push("vmprobe-cli-tests");
    let _ = std::fs::create_dir_all(&dir);
    let file_path = dir.join("plain-file.txt");
    std::fs::write(&file_path, "not a socket").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_vmprobe"))
        .args(["-p", file_path.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("not a socket"));

    let _ = std::fs::remove_file(&file_path);
}

#[test]
fn test_cli_register_dump_session() {
    let path = scratch_socket("session");
    let listener = UnixListener::bind(&path).expect("bind fake monitor socket");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream
            .write_all(b"{\"QMP\": {\"version\": {}, \"capabilities\": []}\r\n")
            .unwrap();

        let mut buf = [0u8; 1024];

        // Capabilities negotiation.
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0);
        stream.write_all(b"{\"return\": {}}\r\n").unwrap();

        // Register query.
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0);
        stream
            .write_all(
                b"{\"return\": \"RAX=00000000000000aa RBX=0000000000000002 RCX=0000000000000003 RDX=0000000000000004\r\n\
RSI=0000000000000005 RDI=0000000000000006 RBP=0000000000000007 RSP=0000000000000008\r\n\
R8 =0000000000000009 R9 =000000000000000a R10=000000000000000b R11=000000000000000c\r\n\
R12=000000000000000d R13=000000000000000e R14=000000000000000f R15=0000000000000010\r\n\
RIP=ffffffff81000000 RFL=00000246 CPL=0\r\n\
ES =0000 CS =0010 SS =0018 DS =0000 FS =0000 GS =0000\r\n\
CR0=0000000080050033 CR2=00007f0000001000 CR3=0000000001c0a000 CR4=00000000003606e0\r\n\
EFER=0000000000000d01\r\n\"}",
            )
            .unwrap();
    });

    let mut child = Command::new(env!("CARGO_BIN_EXE_vmprobe"))
        .args(["-p", path.to_str().unwrap()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn vmprobe");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"r\nq\n")
        .unwrap();

    let output = child.wait_with_output().expect("wait for vmprobe");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("RAX=0x00000000000000aa"));
    assert!(stdout.contains("CR4=0x00000000003606e0"));

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}
