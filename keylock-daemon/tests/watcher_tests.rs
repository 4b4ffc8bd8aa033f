//! LockWatcher setup against shell-script stand-ins for the X11 tools.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use keylock_core::FunctionKey;
use keylock_daemon::{Collaborators, DaemonError, LockWatcher, Service};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;

const PKE_DUMP: &str = "\
keycode  66 = Caps_Lock NoSymbol Caps_Lock
keycode  67 = F1 F1 F1 F1 F1 F1 XF86Switch_VT_1
keycode  68 = F2 F2 F2 F2 F2 F2 XF86Switch_VT_2
keycode  72 = F6 F6 F6 F6 F6 F6 XF86Switch_VT_6
";

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path.display().to_string()
}

fn fake_tools(dir: &Path, dump: &str) -> Collaborators {
    fs::write(dir.join("pke.txt"), dump).expect("write dump");
    Collaborators {
        locker: script(dir, "xscreensaver", "exec sleep 30"),
        locker_command: script(dir, "xscreensaver-command", "exec sleep 30"),
        xmodmap: script(
            dir,
            "xmodmap",
            &format!("[ \"$1\" = \"-pke\" ] && cat '{}'", dir.join("pke.txt").display()),
        ),
        ..Collaborators::default()
    }
}

fn is_gone(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if kill(Pid::from_raw(pid as i32), None) == Err(Errno::ESRCH) {
            return true;
        }
        sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn pre_start_spawns_children_and_builds_tables() {
    let dir = TempDir::new().expect("tempdir");
    let mut watcher = LockWatcher::new(fake_tools(dir.path(), PKE_DUMP));

    watcher
        .pre_start(&dir.path().join("keylock.pid"))
        .expect("pre_start");

    let pids = watcher.child_ids();
    assert_eq!(pids.len(), 2, "locker and status stream should be running");

    let maps = watcher.maps().expect("tables");
    assert_eq!(maps.origin.len(), 3);
    assert_eq!(maps.lock.len(), 3);
    assert!(maps
        .lock
        .entries()
        .iter()
        .all(|entry| entry.keysyms.first().map(String::as_str) == Some("F6")));

    watcher.post_failure_cleanup();
    assert!(watcher.child_ids().is_empty());
    for pid in pids {
        assert!(is_gone(pid), "child {pid} should be terminated");
    }
}

#[test]
fn pre_start_refuses_existing_pidfile_without_spawning() {
    let dir = TempDir::new().expect("tempdir");
    let pidfile = dir.path().join("keylock.pid");
    fs::write(&pidfile, "garbage").expect("write pidfile");

    let mut watcher = LockWatcher::new(fake_tools(dir.path(), PKE_DUMP));
    let err = watcher.pre_start(&pidfile).unwrap_err();

    assert!(matches!(err, DaemonError::PidfilePresent { .. }), "got: {err}");
    assert!(err.to_string().contains("keylock.pid"));
    assert!(watcher.child_ids().is_empty());
}

#[test]
fn missing_reference_key_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let dump = "keycode  67 = F1 F1 F1 F1 F1 F1 XF86Switch_VT_1\n";
    let mut watcher = LockWatcher::new(fake_tools(dir.path(), dump));

    let err = watcher
        .pre_start(&dir.path().join("keylock.pid"))
        .unwrap_err();
    assert!(matches!(err, DaemonError::Keymap(_)), "got: {err}");

    let pids = watcher.child_ids();
    watcher.post_failure_cleanup();
    for pid in pids {
        assert!(is_gone(pid), "child {pid} should be terminated");
    }
}

#[test]
fn scan_uses_configured_reference() {
    let dir = TempDir::new().expect("tempdir");
    let mut tools = fake_tools(dir.path(), PKE_DUMP);
    tools.reference = FunctionKey(2);
    let watcher = LockWatcher::new(tools);

    let maps = watcher.scan_fkeys().expect("scan");
    assert!(maps.lock.entries().iter().all(|e| e.keysyms[0] == "F2"));
    assert_eq!(maps.origin.entries()[0].keysyms[0], "F1");
}
