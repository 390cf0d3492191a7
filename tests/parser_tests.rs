use std::fs;
use std::path::PathBuf;
use zesarux_dap::debugger::WatchAccess;
use zesarux_dap::parser::{parse_console_command, parse_number, ConsoleCommand, Labels, Listing, SymbolTable};

// Helper to create a fixture file
fn create_fixture(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("zesarux_dap_{}_{}", std::process::id(), name));
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_file(path);
}

const LISTING: &str = "# file opened: main.asm
1     8000              main:
2     8000 3E 01            ld a,1
3     8002 CD 00 90         call print
4     8005              ; done
garbage
";

#[cfg(test)]
mod label_tests {
    use super::*;

    #[test]
    fn test_sjasmplus_and_z88dk_formats() {
        let mut labels = Labels::new();
        let added = labels.parse_lines(&[
            "main: EQU 0x00008000",
            "print: equ 0x9000",
            "counter = $8100 ; addr, local, , main, , main.c:3",
            "bad line",
            "big: EQU 0x10000",
        ]);

        assert_eq!(added, 3);
        assert_eq!(labels.labels_for(0x8000), vec!["main"]);
        assert_eq!(labels.address_of("counter"), Some(0x8100));
        assert_eq!(labels.address_of("PRINT"), Some(0x9000));
        assert_eq!(labels.address_of("big"), None);
    }

    #[test]
    fn test_several_labels_at_one_address() {
        let mut labels = Labels::new();
        labels.insert("main", 0x8000);
        labels.insert("start", 0x8000);
        labels.insert("main", 0x8000);

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.labels_for(0x8000), vec!["main", "start"]);
        assert_eq!(labels.label_or_hex(0x8000), "main");
        assert_eq!(labels.label_or_hex(0x1234), "1234h");
    }

    #[test]
    fn test_load_label_file() {
        let path = create_fixture("labels.txt", "main: EQU 0x00008000\nloop: EQU 0x00008010\n");
        let mut labels = Labels::new();
        assert_eq!(labels.load_file(&path).unwrap(), 2);
        assert_eq!(labels.address_of("loop"), Some(0x8010));
        cleanup(&path);
    }

    #[test]
    fn test_parse_number_notations() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("$1F"), Some(31));
        assert_eq!(parse_number("#1f"), Some(31));
        assert_eq!(parse_number("1Fh"), Some(31));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("zz"), None);
    }
}

#[cfg(test)]
mod listing_tests {
    use super::*;

    #[test]
    fn test_line_address_mapping() {
        let lines: Vec<&str> = LISTING.lines().collect();
        let listing = Listing::from_lines(&lines);

        assert_eq!(listing.len(), 4);
        assert_eq!(listing.address_of_line(0), None);
        assert_eq!(listing.address_of_line(1), Some(0x8000));
        assert_eq!(listing.address_of_line(3), Some(0x8002));
        assert_eq!(listing.address_of_line(5), None);
        // the instruction wins over the label on the same address
        assert_eq!(listing.line_of_address(0x8000), Some(2));
        assert_eq!(listing.line_of_address(0x8005), Some(4));
        assert_eq!(listing.line_of_address(0x9000), None);
    }

    #[test]
    fn test_load_keeps_path() {
        let path = create_fixture("main.lis", LISTING);
        let listing = Listing::load(&path).unwrap();
        assert_eq!(listing.path, path);
        assert_eq!(listing.line_of_address(0x8002), Some(3));
        cleanup(&path);
    }
}

#[cfg(test)]
mod console_tests {
    use super::*;

    #[test]
    fn test_exec_joins_arguments() {
        assert_eq!(
            parse_console_command("-exec get-registers"),
            Ok(ConsoleCommand::Exec("get-registers".to_string()))
        );
        assert_eq!(
            parse_console_command("-e \"read-memory 0 4\""),
            Ok(ConsoleCommand::Exec("read-memory 0 4".to_string()))
        );
        assert!(parse_console_command("-exec").is_err());
    }

    #[test]
    fn test_memory_dump_defaults() {
        assert_eq!(
            parse_console_command("-md 0x8000 32"),
            Ok(ConsoleCommand::MemoryDump {
                addr: "0x8000".to_string(),
                len: 32
            })
        );
        assert_eq!(
            parse_console_command("-md main"),
            Ok(ConsoleCommand::MemoryDump {
                addr: "main".to_string(),
                len: 16
            })
        );
        assert!(parse_console_command("-md").is_err());
    }

    #[test]
    fn test_watchpoint_commands() {
        assert_eq!(
            parse_console_command("-wpadd counter 2 w"),
            Ok(ConsoleCommand::WatchAdd {
                addr: "counter".to_string(),
                size: 2,
                access: WatchAccess::Write
            })
        );
        assert_eq!(
            parse_console_command("-wpadd 0xC000"),
            Ok(ConsoleCommand::WatchAdd {
                addr: "0xC000".to_string(),
                size: 1,
                access: WatchAccess::ReadWrite
            })
        );
        assert!(parse_console_command("-wpadd 0xC000 1 x").is_err());
        assert_eq!(
            parse_console_command("-wprm counter"),
            Ok(ConsoleCommand::WatchRemove {
                addr: "counter".to_string(),
                size: 1
            })
        );
    }

    #[test]
    fn test_sprite_commands() {
        assert_eq!(
            parse_console_command("-patterns 3 2"),
            Ok(ConsoleCommand::Patterns { index: 3, count: 2 })
        );
        assert!(parse_console_command("-patterns 300").is_err());
        assert_eq!(
            parse_console_command("-sprites"),
            Ok(ConsoleCommand::Sprites { slot: 0, count: 1 })
        );
        assert_eq!(parse_console_command("-palette"), Ok(ConsoleCommand::Palette(None)));
        assert_eq!(
            parse_console_command("-palette second"),
            Ok(ConsoleCommand::Palette(Some(1)))
        );
        assert!(parse_console_command("-palette third").is_err());
    }

    #[test]
    fn test_other_input() {
        assert_eq!(parse_console_command("-help"), Ok(ConsoleCommand::Help));
        assert_eq!(
            parse_console_command("-label main"),
            Ok(ConsoleCommand::Label("main".to_string()))
        );
        assert_eq!(
            parse_console_command("  HL "),
            Ok(ConsoleCommand::Lookup("HL".to_string()))
        );
        assert!(parse_console_command("-bogus").is_err());
        assert!(parse_console_command("").is_err());
        assert!(parse_console_command("-exec \"unbalanced").is_err());
    }
}
