mod common;

use common::*;
use zesarux_dap::z80::opcodes::*;
use zesarux_dap::z80::registers::{FLAG_C, FLAG_PV, FLAG_S, FLAG_Z};
use zesarux_dap::z80::{decode_flags, DecodeError, RegisterSnapshot};

#[cfg(test)]
mod register_tests {
    use super::*;

    #[test]
    fn test_decode_register_dump() {
        let line = "PC=8000 SP=ff44 AF=005c BC=174b HL=107f DE=0006 IX=ffff IY=5c3a AF'=0044 BC'=ffff HL'=ffff DE'=5cb9 I=3f R=78  F=-Z-H-P-- F'=-Z---P-- MEMPTR=0000 IM1 IFF-- VPS: 0";
        let regs: RegisterSnapshot = line.parse().unwrap();

        assert_eq!(regs.pc, 0x8000);
        assert_eq!(regs.sp, 0xff44);
        assert_eq!(regs.af, 0x005c);
        assert_eq!(regs.hl, 0x107f);
        assert_eq!(regs.de2, 0x5cb9);
        assert_eq!(regs.i, 0x3f);
        assert_eq!(regs.im, Some(1));
        assert!(!regs.iff1);
        assert_eq!(regs.pc_bytes, None);
        assert_eq!(regs.sp_content, None);
    }

    #[test]
    fn test_decode_history_line() {
        let regs = history_line(0x8003, 0xfff0, [0xcd, 0x34, 0x12, 0x00], 0xabcd);
        assert_eq!(regs.pc_bytes, Some([0xcd, 0x34, 0x12, 0x00]));
        assert_eq!(regs.sp_content, Some(0xabcd));
    }

    #[test]
    fn test_decode_flags() {
        assert_eq!(decode_flags("--------").unwrap(), 0);
        assert_eq!(decode_flags("SZ5H3PNC").unwrap(), 0xff);
        assert_eq!(decode_flags("-Z-H-P--").unwrap(), 0x54);
        assert_eq!(decode_flags("-------C").unwrap(), FLAG_C);
        assert!(decode_flags("SZ").is_err());
    }

    #[test]
    fn test_flags_string_matches_af() {
        let regs: RegisterSnapshot = reg_dump(0, 0, "SZ---P-C").parse().unwrap();
        assert_eq!(regs.flags_string(), "SZ---P-C");
        assert!(regs.flag(FLAG_S));
        assert!(regs.flag(FLAG_Z));
        assert!(regs.flag(FLAG_PV));
    }

    #[test]
    fn test_truncated_line_is_rejected() {
        let err = "PC=8000 SP=ff44 AF=005c".parse::<RegisterSnapshot>().unwrap_err();
        assert_eq!(err, DecodeError::MissingField("BC"));
    }

    #[test]
    fn test_malformed_field_is_rejected() {
        let line = reg_dump(0x8000, 0xff00, "--------").replace("PC=8000", "PC=80");
        assert!(matches!(
            line.parse::<RegisterSnapshot>(),
            Err(DecodeError::MalformedField { .. })
        ));
    }

    #[test]
    fn test_register_lookup_by_name() {
        let regs: RegisterSnapshot = reg_dump(0x8000, 0xff00, "--------").parse().unwrap();
        assert_eq!(regs.get("hl"), Some(0x5678));
        assert_eq!(regs.get("H"), Some(0x56));
        assert_eq!(regs.get("l"), Some(0x78));
        assert_eq!(regs.get("xyz"), None);
    }
}

#[cfg(test)]
mod opcode_tests {
    use super::*;

    #[test]
    fn test_call_target_is_little_endian() {
        let bytes = [0xCD, 0x34, 0x12];
        assert!(is_call(&bytes));
        assert_eq!(call_target(&bytes), Some(0x1234));
    }

    #[test]
    fn test_conditional_call() {
        // CALL Z,nn
        let bytes = [0xCC, 0x00, 0x80];
        assert!(is_call(&bytes));
        assert!(is_conditional_call_taken(&bytes, FLAG_Z));
        assert!(!is_conditional_call_taken(&bytes, 0));
        // CALL M,nn
        assert!(is_conditional_call_taken(&[0xFC, 0, 0], FLAG_S));
        assert!(!is_conditional_call_taken(&[0xFC, 0, 0], 0));
    }

    #[test]
    fn test_unconditional_ret_is_always_taken() {
        assert!(is_ret(&[0xC9]));
        assert!(is_conditional_ret_taken(&[0xC9], FLAG_Z));
        assert!(is_conditional_ret_taken(&[0xC9], 0));
    }

    #[test]
    fn test_ret_z_with_z_clear_is_not_taken() {
        assert!(is_ret(&[0xC8]));
        assert!(!is_conditional_ret_taken(&[0xC8], 0));
        assert!(is_conditional_ret_taken(&[0xC8], FLAG_Z));
    }

    #[test]
    fn test_all_conditions() {
        // NZ Z NC C PO PE P M
        let cases = [
            (0, 0, true),
            (1, FLAG_Z, true),
            (2, FLAG_C, false),
            (3, FLAG_C, true),
            (4, FLAG_PV, false),
            (5, FLAG_PV, true),
            (6, FLAG_S, false),
            (7, FLAG_S, true),
        ];
        for (cc, flags, expected) in cases {
            assert_eq!(condition_met(cc, flags), expected, "cc {}", cc);
        }
    }

    #[test]
    fn test_reti_and_retn() {
        assert!(is_ret(&[0xED, 0x4D]));
        assert!(is_ret(&[0xED, 0x45]));
        assert!(is_conditional_ret_taken(&[0xED, 0x4D], 0));
        assert!(!is_ret(&[0xED, 0xB0]));
    }

    #[test]
    fn test_rst() {
        assert!(is_rst(&[0xFF]));
        assert!(is_rst(&[0xC7]));
        assert_eq!(rst_target(0xEF), 0x28);
        assert!(!is_rst(&[0xCD]));
    }

    #[test]
    fn test_push_pop_and_pushed_value() {
        let regs: RegisterSnapshot = reg_dump(0x8000, 0xff00, "--------").parse().unwrap();
        assert!(is_push(&[0xE5]));
        assert_eq!(pushed_value(&[0xE5], &regs), Some(0x5678));
        assert_eq!(pushed_value(&[0xC5], &regs), Some(0x1234));
        assert_eq!(pushed_value(&[0xDD, 0xE5], &regs), Some(0xffff));
        // ZX Next PUSH nn has a big endian operand
        assert!(is_push(&[0xED, 0x8A, 0x12, 0x34]));
        assert_eq!(pushed_value(&[0xED, 0x8A, 0x12, 0x34], &regs), Some(0x1234));

        assert!(is_pop(&[0xD1]));
        assert!(is_pop(&[0xFD, 0xE1]));
        assert!(!is_pop(&[0xE5]));
    }

    #[test]
    fn test_direct_sp_change() {
        let regs: RegisterSnapshot = reg_dump(0x8000, 0xff00, "--------").parse().unwrap();
        assert_eq!(direct_sp_change(&[0x33], &regs), SpChange::Delta(1));
        assert_eq!(direct_sp_change(&[0x3B], &regs), SpChange::Delta(-1));
        assert_eq!(direct_sp_change(&[0x31, 0x00, 0x60], &regs), SpChange::Load(0x6000));
        assert_eq!(direct_sp_change(&[0xF9], &regs), SpChange::Load(0x5678));
        assert_eq!(
            direct_sp_change(&[0xED, 0x7B, 0x00, 0x60], &regs),
            SpChange::Indeterminate
        );
        assert_eq!(direct_sp_change(&[0x00], &regs), SpChange::Delta(0));
    }

    #[test]
    fn test_caller_target() {
        assert_eq!(caller_target(&[0xCD, 0x00, 0x90]), Some(0x9000));
        assert_eq!(caller_target(&[0xC4, 0x00, 0x90]), Some(0x9000));
        assert_eq!(caller_target(&[0x00, 0x00, 0xD7]), Some(0x10));
        assert_eq!(caller_target(&[0x00, 0x00, 0x00]), None);
    }
}
