mod common;

use common::*;
use std::sync::mpsc;
use zesarux_dap::debugger::{
    native_condition, BreakpointManager, BreakpointRequest, DebugEvent, Events, IdPool,
    WatchAccess, Watchpoint,
};
use zesarux_dap::parser::{translate_condition, Labels};
use zesarux_dap::Error;

fn labels() -> Labels {
    let mut labels = Labels::new();
    labels.insert("counter", 0x8100);
    labels.insert("main", 0x8000);
    labels
}

#[cfg(test)]
mod id_pool_tests {
    use super::*;

    #[test]
    fn test_pool_of_three() {
        let mut pool = IdPool::new(3);
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(3));
        assert_eq!(pool.allocate(), None);

        assert!(pool.release(2));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_release_unknown_id() {
        let mut pool = IdPool::new(3);
        assert!(!pool.release(2));
        assert_eq!(pool.allocate(), Some(1));
        assert!(pool.release(1));
        assert!(!pool.release(1), "double release must not duplicate the id");
        assert_eq!(pool.available(), 3);
    }
}

#[cfg(test)]
mod condition_tests {
    use super::*;

    #[test]
    fn test_operators() {
        let out = translate_condition("A == 1 && !(B == 2)", &labels());
        assert_eq!(out, "A = 1 AND NOT(B = 2)");
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(translate_condition("0x1F", &labels()), "1FH");
        assert_eq!(translate_condition("HL != $c000", &labels()), "HL <> C000H");
    }

    #[test]
    fn test_memory_access_and_symbols() {
        let out = translate_condition("b@(counter) == 3 || w@(HL) == 0", &labels());
        assert_eq!(out, "peek(33024) = 3 OR peekw(HL) = 0");
    }

    #[test]
    fn test_unknown_identifier_is_kept() {
        assert_eq!(translate_condition("missing == 1", &labels()), "missing = 1");
    }

    #[test]
    fn test_native_condition() {
        let labels = labels();
        assert_eq!(native_condition(Some(0x8000), None, &labels), "PC=8000H");
        assert_eq!(
            native_condition(Some(0x8000), Some("a == 2"), &labels),
            "PC=8000H AND (A = 2)"
        );
        assert_eq!(native_condition(None, Some("a == 2"), &labels), "A = 2");
    }
}

#[cfg(test)]
mod manager_tests {
    use super::*;

    fn at(addr: u16) -> BreakpointRequest {
        BreakpointRequest {
            address: Some(addr),
            ..BreakpointRequest::default()
        }
    }

    #[test]
    fn test_ids_survive_remove_and_add() {
        let mut emu = MockEmulator::new();
        let mut manager = BreakpointManager::new(4);
        let events = Events::default();
        let labels = labels();

        let ids: Vec<u16> = (0..3)
            .map(|i| {
                manager
                    .set_breakpoint(&mut emu, &labels, &events, at(0x8000 + i))
                    .unwrap()
                    .id
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(matches!(
            manager.set_breakpoint(&mut emu, &labels, &events, at(0x9000)),
            Err(Error::NoBreakpointId)
        ));

        manager.remove_breakpoint(&mut emu, 2).unwrap();
        assert_eq!(emu.sent_matching("disable-breakpoint"), vec!["disable-breakpoint 2"]);
        let bp = manager
            .set_breakpoint(&mut emu, &labels, &events, at(0x9000))
            .unwrap();
        assert_eq!(bp.id, 2);
        assert_eq!(manager.breakpoints().count(), 3);
    }

    #[test]
    fn test_set_breakpoint_commands() {
        let mut emu = MockEmulator::new();
        let mut manager = BreakpointManager::new(100);
        let request = BreakpointRequest {
            address: Some(0x8000),
            condition: Some("b@(counter) == 5".to_string()),
            log_message: None,
        };
        let bp = manager
            .set_breakpoint(&mut emu, &labels(), &Events::default(), request)
            .unwrap();

        assert!(bp.verified);
        assert_eq!(
            emu.sent,
            vec![
                "set-breakpoint 1 PC=8000H AND (peek(33024) = 5)".to_string(),
                "enable-breakpoint 1".to_string(),
            ]
        );
        assert!(manager.has_address(0x8000));
    }

    #[test]
    fn test_rejected_breakpoint_frees_id() {
        let mut emu = MockEmulator::new();
        emu.respond("set-breakpoint 1 PC=8000H", "Error. Invalid expression");
        let mut manager = BreakpointManager::new(100);

        let bp = manager
            .set_breakpoint(&mut emu, &labels(), &Events::default(), at(0x8000))
            .unwrap();
        assert!(!bp.verified);
        assert!(!manager.has_address(0x8000));
        assert!(emu.sent_matching("enable-breakpoint").is_empty());
    }

    #[test]
    fn test_logpoint_degrades_with_warning() {
        let mut emu = MockEmulator::new();
        let (tx, rx) = mpsc::channel();
        let mut manager = BreakpointManager::new(100);
        let request = BreakpointRequest {
            address: Some(0x8000),
            condition: Some("A == 1".to_string()),
            log_message: Some("A is {A}".to_string()),
        };

        let bp = manager
            .set_breakpoint(&mut emu, &labels(), &Events::new(tx), request)
            .unwrap();
        assert!(bp.verified);
        assert_eq!(bp.native_condition, "PC=8000H");
        assert!(matches!(rx.try_recv(), Ok(DebugEvent::Warning(_))));
    }

    #[test]
    fn test_transient_slot_is_reserved() {
        let mut emu = MockEmulator::new();
        let mut manager = BreakpointManager::new(3);
        assert_eq!(manager.transient_id(), 3);

        manager.arm_transient(&mut emu, "PC=8003H").unwrap();
        manager.disarm_transient(&mut emu).unwrap();
        assert_eq!(
            emu.sent,
            vec!["set-breakpoint 3 PC=8003H", "enable-breakpoint 3", "disable-breakpoint 3"]
        );

        let events = Events::default();
        let labels = labels();
        assert!(manager.set_breakpoint(&mut emu, &labels, &events, at(1)).is_ok());
        assert!(manager.set_breakpoint(&mut emu, &labels, &events, at(2)).is_ok());
        assert!(manager.set_breakpoint(&mut emu, &labels, &events, at(3)).is_err());
    }

    #[test]
    fn test_watchpoint_commands() {
        let mut emu = MockEmulator::new();
        let mut manager = BreakpointManager::new(100);
        let watchpoint = Watchpoint {
            addr: 0xC000,
            size: 2,
            access: WatchAccess::Write,
            condition: None,
        };

        manager
            .set_watchpoint(&mut emu, &Events::default(), watchpoint)
            .unwrap();
        manager.remove_watchpoint(&mut emu, 0xC000, 2).unwrap();
        assert_eq!(
            emu.sent,
            vec!["set-membreakpoint C000h 2 2", "set-membreakpoint C000h 0 2"]
        );
        assert!(manager.watchpoints().is_empty());
    }

    #[test]
    fn test_conditional_watchpoint_is_rejected() {
        let mut emu = MockEmulator::new();
        let (tx, rx) = mpsc::channel();
        let mut manager = BreakpointManager::new(100);
        let watchpoint = Watchpoint {
            addr: 0xC000,
            size: 1,
            access: WatchAccess::ReadWrite,
            condition: Some("A == 1".to_string()),
        };

        let result = manager.set_watchpoint(&mut emu, &Events::new(tx), watchpoint);
        assert!(matches!(result, Err(Error::Unsupported(_))));
        assert!(emu.sent.is_empty());
        assert!(matches!(rx.try_recv(), Ok(DebugEvent::Warning(_))));
    }
}
