//! Generated board-side micro-snippets.
//!
//! Every filesystem operation is a small piece of Python source executed on
//! the board through the raw REPL.  Anything that would otherwise cost one
//! round trip per entry (hidden-entry filtering, recursive deletes) runs
//! board-side inside the generated snippet.  Replies are line-oriented with
//! TAB-separated fields, printed by the snippet itself.

use crate::files::types::ClockValues;
use pydeck_serial::serial::types::BoardFamily;

// ── Literal builders ─────────────────────────────────────────────────────────

/// Quote a string as a Python single-quoted literal.
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Render data as a Python bytes literal (`b'...'`).
pub fn bytes_literal(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + 3);
    out.push_str("b'");
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push('\'');
    out
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Path prefix used to stat entries of `dir` board-side.
fn dir_prefix(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

// ── Listing ──────────────────────────────────────────────────────────────────

/// Print the names in `dir`, one per line.
pub fn ls(dir: &str) -> String {
    format!(
        "import os\nfor name in os.listdir({}):\n    print(name)\n",
        py_str(dir)
    )
}

/// Print one line per entry of `dir`: the name followed by stat fields,
/// TAB-separated.  Compact form carries (mode, size, mtime); `full_stat`
/// carries the whole 10-field tuple.  Hidden entries (leading `.`, trailing
/// `~`) are filtered board-side unless `show_hidden` is set, so they are
/// never transferred at all.
pub fn lls(dir: &str, full_stat: bool, show_hidden: bool) -> String {
    let fields = if full_stat {
        "'\\t'.join(str(x) for x in st)".to_string()
    } else {
        "str(st[0]) + '\\t' + str(st[6]) + '\\t' + str(st[8])".to_string()
    };
    let filter = if show_hidden {
        String::new()
    } else {
        "    if name.startswith('.') or name.endswith('~'):\n        continue\n".to_string()
    };
    format!(
        "import os\nfor name in os.listdir({dir}):\n{filter}    st = os.stat({prefix} + name)\n    print(name + '\\t' + {fields})\n",
        dir = py_str(dir),
        filter = filter,
        prefix = py_str(&dir_prefix(dir)),
        fields = fields,
    )
}

// ── Working directory ────────────────────────────────────────────────────────

pub fn pwd() -> String {
    "import os\nprint(os.getcwd())\n".to_string()
}

pub fn cd(dir: &str) -> String {
    format!("import os\nos.chdir({})\n", py_str(dir))
}

// ── Create / remove ──────────────────────────────────────────────────────────

pub fn mkdir(dir: &str) -> String {
    format!("import os\nos.mkdir({})\n", py_str(dir))
}

pub fn rmdir(dir: &str) -> String {
    format!("import os\nos.rmdir({})\n", py_str(dir))
}

pub fn rm(file: &str) -> String {
    format!("import os\nos.remove({})\n", py_str(file))
}

/// Board-side tree delete.  Prints `True` on success.  With `force` every
/// stat/remove error is swallowed and the walk continues.
pub fn rmrf(name: &str, recursive: bool, force: bool) -> String {
    format!(
        concat!(
            "import os\n",
            "def remove_item(name, recursive, force):\n",
            "    try:\n",
            "        mode = os.stat(name)[0]\n",
            "        if mode & 0x4000 != 0:\n",
            "            if recursive:\n",
            "                for entry in os.listdir(name):\n",
            "                    ok = remove_item(name + '/' + entry, recursive, force)\n",
            "                    if not ok and not force:\n",
            "                        return False\n",
            "            os.rmdir(name)\n",
            "        else:\n",
            "            os.remove(name)\n",
            "    except OSError:\n",
            "        if not force:\n",
            "            return False\n",
            "    return True\n",
            "print(remove_item({name}, {recursive}, {force}))\n",
        ),
        name = py_str(name),
        recursive = py_bool(recursive),
        force = py_bool(force),
    )
}

// ── Transfer ─────────────────────────────────────────────────────────────────

/// Number of content bytes per generated `write` statement.  Bounds the size
/// of any single statement so the board's input buffer is never exceeded.
pub const PUT_CHUNK_SIZE: usize = 64;

/// Chunk size of the board-side read loop in [`get`].
pub const GET_CHUNK_SIZE: usize = 32;

/// Statement sequence writing `data` to `device_file`, executed as one
/// raw-mode batch.
pub fn put_commands(device_file: &str, data: &[u8]) -> Vec<String> {
    let mut commands = Vec::with_capacity(data.len() / PUT_CHUNK_SIZE + 2);
    commands.push(format!("f = open({}, 'wb')\n", py_str(device_file)));
    for chunk in data.chunks(PUT_CHUNK_SIZE) {
        commands.push(format!("f.write({})\n", bytes_literal(chunk)));
    }
    commands.push("f.close()\n".to_string());
    commands
}

/// Stream `device_file` to stdout in small chunks; the host captures the
/// combined stdout as the file content.
pub fn get(device_file: &str) -> String {
    format!(
        concat!(
            "import sys\n",
            "with open({name}, 'rb') as f:\n",
            "    while True:\n",
            "        data = f.read({chunk})\n",
            "        if not data:\n",
            "            break\n",
            "        sys.stdout.write(data)\n",
        ),
        name = py_str(device_file),
        chunk = GET_CHUNK_SIZE,
    )
}

// ── Filesystem info ──────────────────────────────────────────────────────────

/// Print `name TAB total TAB used TAB free` per mount, from statvfs block
/// arithmetic.
pub fn fs_info() -> String {
    concat!(
        "import os\n",
        "mounts = []\n",
        "try:\n",
        "    for name in os.listdir('/'):\n",
        "        if os.stat('/' + name)[0] & 0x4000 != 0:\n",
        "            mounts.append('/' + name)\n",
        "except OSError:\n",
        "    pass\n",
        "if not mounts:\n",
        "    mounts = ['/']\n",
        "for mount in mounts:\n",
        "    try:\n",
        "        st = os.statvfs(mount)\n",
        "        total = st[2] * st[1]\n",
        "        free = st[3] * st[1]\n",
        "        print(mount + '\\t' + str(total) + '\\t' + str(total - free) + '\\t' + str(free))\n",
        "    except OSError:\n",
        "        pass\n",
    )
    .to_string()
}

// ── Introspection / clock ────────────────────────────────────────────────────

pub fn version() -> String {
    "import os\nprint('\\t'.join(os.uname()))\n".to_string()
}

pub fn implementation() -> String {
    concat!(
        "import sys\n",
        "impl = sys.implementation\n",
        "print(impl.name + '\\t' + '.'.join(str(x) for x in impl.version))\n",
    )
    .to_string()
}

pub fn get_time() -> String {
    "import time\nt = time.localtime()\nprint('\\t'.join(str(x) for x in t[:6]))\n".to_string()
}

/// RTC-sync snippet for the given board family, or `None` for families
/// without a host-settable clock.
pub fn sync_time(family: BoardFamily, clock: &ClockValues) -> Option<String> {
    let ClockValues {
        year,
        month,
        day,
        weekday,
        hour,
        minute,
        second,
        yearday,
    } = *clock;

    match family {
        BoardFamily::PyBoard => Some(format!(
            "import pyb\nrtc = pyb.RTC()\nrtc.datetime(({}, {}, {}, {}, {}, {}, {}, 0))\n",
            year, month, day, weekday, hour, minute, second
        )),
        // Standard machine.RTC, with the init() fallback the LoBo firmware
        // needs instead of datetime().
        BoardFamily::Esp => Some(format!(
            concat!(
                "import machine\n",
                "rtc = machine.RTC()\n",
                "try:\n",
                "    rtc.datetime(({y}, {mo}, {d}, {wd}, {h}, {mi}, {s}, 0))\n",
                "except Exception:\n",
                "    rtc.init(({y}, {mo}, {d}, {h}, {mi}, {s}))\n",
            ),
            y = year,
            mo = month,
            d = day,
            wd = weekday,
            h = hour,
            mi = minute,
            s = second,
        )),
        BoardFamily::CircuitPython => Some(format!(
            concat!(
                "import rtc\n",
                "import time\n",
                "clock = rtc.RTC()\n",
                "clock.datetime = time.struct_time(({}, {}, {}, {}, {}, {}, {}, {}, -1))\n",
            ),
            year,
            month,
            day,
            hour,
            minute,
            second,
            weekday - 1,
            yearday,
        )),
        // The RP2040 RTC block is written directly: SETUP_0/SETUP_1, then
        // the LOAD bit in CTRL.
        BoardFamily::Rp2040 => Some(format!(
            concat!(
                "import machine\n",
                "setup_0 = {y} << 12 | {mo} << 8 | {d}\n",
                "setup_1 = {wd0} << 24 | {h} << 16 | {mi} << 8 | {s}\n",
                "machine.mem32[0x4005c004] = setup_0\n",
                "machine.mem32[0x4005c008] = setup_1\n",
                "machine.mem32[0x4005c00c] = machine.mem32[0x4005c00c] | 0x10\n",
            ),
            y = year,
            mo = month,
            d = day,
            wd0 = weekday % 7,
            h = hour,
            mi = minute,
            s = second,
        )),
        BoardFamily::Pycom => Some(format!(
            "import machine\nrtc = machine.RTC()\nrtc.init(({}, {}, {}, {}, {}, {}, 0, 0))\n",
            year, month, day, hour, minute, second
        )),
        BoardFamily::Teensy => Some(format!(
            "import machine\nrtc = machine.RTC()\nrtc.datetime(({}, {}, {}, {}, {}, {}, {}, 0))\n",
            year, month, day, weekday, hour, minute, second
        )),
        // No settable RTC on these; clock sync is a silent no-op.
        BoardFamily::Microbit | BoardFamily::CalliopeMini | BoardFamily::Generic => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> ClockValues {
        ClockValues {
            year: 2026,
            month: 8,
            day: 6,
            weekday: 4,
            hour: 12,
            minute: 34,
            second: 56,
            yearday: 218,
        }
    }

    #[test]
    fn test_py_str_escaping() {
        assert_eq!(py_str("main.py"), "'main.py'");
        assert_eq!(py_str("it's"), "'it\\'s'");
        assert_eq!(py_str("a\\b"), "'a\\\\b'");
        assert_eq!(py_str("a\nb"), "'a\\nb'");
    }

    #[test]
    fn test_bytes_literal() {
        assert_eq!(bytes_literal(b"abc"), "b'abc'");
        assert_eq!(bytes_literal(b"a'b"), "b'a\\'b'");
        assert_eq!(bytes_literal(b"\r\n"), "b'\\r\\n'");
        assert_eq!(bytes_literal(&[0x00, 0xFF]), "b'\\x00\\xff'");
    }

    #[test]
    fn test_ls_snippet() {
        let snippet = ls("/lib");
        assert!(snippet.contains("os.listdir('/lib')"));
        assert!(snippet.contains("print(name)"));
    }

    #[test]
    fn test_lls_hidden_filter_is_board_side() {
        let filtered = lls("", false, false);
        assert!(filtered.contains("name.startswith('.')"));
        assert!(filtered.contains("name.endswith('~')"));

        let unfiltered = lls("", false, true);
        assert!(!unfiltered.contains("startswith"));
    }

    #[test]
    fn test_lls_full_stat_fields() {
        let compact = lls("/", false, true);
        assert!(compact.contains("st[0]"));
        assert!(compact.contains("st[6]"));
        assert!(compact.contains("st[8]"));

        let full = lls("/", true, true);
        assert!(full.contains("for x in st"));
    }

    #[test]
    fn test_lls_prefixes_nested_dir() {
        let snippet = lls("/lib", false, true);
        assert!(snippet.contains("os.stat('/lib/' + name)"));

        let root = lls("", false, true);
        assert!(root.contains("os.stat('' + name)"));
    }

    #[test]
    fn test_rmrf_flags() {
        let snippet = rmrf("/data", true, false);
        assert!(snippet.contains("print(remove_item('/data', True, False))"));
        let snippet = rmrf("x", false, true);
        assert!(snippet.contains("print(remove_item('x', False, True))"));
    }

    #[test]
    fn test_put_commands_chunking() {
        let data = vec![b'a'; PUT_CHUNK_SIZE * 2 + 10];
        let commands = put_commands("/main.py", &data);
        // open + 3 chunks + close
        assert_eq!(commands.len(), 5);
        assert!(commands[0].contains("open('/main.py', 'wb')"));
        assert!(commands[1].starts_with("f.write(b'"));
        assert_eq!(commands.last().unwrap(), "f.close()\n");
    }

    #[test]
    fn test_put_commands_empty_file() {
        let commands = put_commands("/empty.py", b"");
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn test_get_snippet() {
        let snippet = get("/boot.py");
        assert!(snippet.contains("open('/boot.py', 'rb')"));
        assert!(snippet.contains("f.read(32)"));
    }

    #[test]
    fn test_fs_info_statvfs_arithmetic() {
        let snippet = fs_info();
        assert!(snippet.contains("os.statvfs"));
        assert!(snippet.contains("st[2] * st[1]"));
    }

    #[test]
    fn test_sync_time_per_family() {
        let clock = clock();
        assert!(sync_time(BoardFamily::PyBoard, &clock)
            .unwrap()
            .contains("pyb.RTC"));
        let esp = sync_time(BoardFamily::Esp, &clock).unwrap();
        assert!(esp.contains("rtc.datetime"));
        assert!(esp.contains("rtc.init"));
        assert!(sync_time(BoardFamily::CircuitPython, &clock)
            .unwrap()
            .contains("time.struct_time"));
        assert!(sync_time(BoardFamily::Rp2040, &clock)
            .unwrap()
            .contains("machine.mem32[0x4005c004]"));
        assert!(sync_time(BoardFamily::Pycom, &clock)
            .unwrap()
            .contains("rtc.init"));
    }

    #[test]
    fn test_sync_time_rtc_less_families() {
        let clock = clock();
        assert!(sync_time(BoardFamily::Microbit, &clock).is_none());
        assert!(sync_time(BoardFamily::CalliopeMini, &clock).is_none());
        assert!(sync_time(BoardFamily::Generic, &clock).is_none());
    }

    #[test]
    fn test_cd_snippet() {
        assert!(cd("/lib").contains("os.chdir('/lib')"));
    }
}
