use std::fs;
use std::path::Path;
use std::process::Command;

use structgen::{generate, Config, TypeRegistry};

const DECLARATIONS: &str = r##"{
  "struct": { "stream": true, "json": true, "unit_test": true },
  "enum": { "json": true, "unit_test": true },
  "enums": {
    "Mode": { "enum": { "off": null, "on": null, "fast": 7 } }
  },
  "structs": {
    "Regs": {
      "fields": [
        { "name": "pad", "type": "uint8" },
        {
          "name": "ctrl",
          "type": "uint32",
          "volatile": true,
          "fields": [
            { "name": "en", "index": 0 },
            { "name": "raw", "index": 1, "width": 4 },
            { "name": "storage", "index": 5, "width": 3 },
            { "name": "mode", "index": 8, "width": 3, "type": "Mode" },
            { "name": "status", "index": 12, "width": 4, "write": false }
          ],
          "alternates": [ { "name": "ctrl_view", "fields": [ { "name": "low", "index": 0, "width": 16 } ] } ]
        },
        { "name": "gain", "type": "float", "expected_offset": 8 },
        {
          "name": "count",
          "type": "uint16",
          "array_length": 2,
          "fields": [ { "name": "lo", "index": 0, "width": 8 }, { "name": "hi", "index": 8, "width": 8 } ]
        },
        { "name": "inner", "type": "Inner" }
      ]
    },
    "Inner": { "fields": [ { "name": "a", "type": "int16" }, { "name": "b", "type": "uint8" } ] }
  }
}"##;

const MANIFEST: &str = r#"[package]
name = "generated_check"
version = "0.0.0"
edition = "2021"
publish = false

[workspace]
"#;

const CHECKS: &str = r#"pub mod generated;

#[cfg(test)]
mod checks {
  use crate::generated::enums::Mode;
  use crate::generated::structs::Regs;
  use crate::generated::Endianness;

  #[test]
  fn set_all_and_get_all_agree() {
    let mut regs = Regs::default();
    regs.set_all_ctrl(1, 5, 3, Mode::fast);

    let (en, raw, storage, mode, status) = regs.get_all_ctrl();
    assert_eq!((1, 5, 3, Mode::fast, 0), (en, raw, storage, mode, status));
    assert_eq!(1 | (5 << 1) | (3 << 5) | (7 << 8), regs.read_ctrl());
    assert_eq!(regs.read_ctrl() & 0xffff, regs.get_ctrl_view_low());
  }

  #[test]
  fn setters_touch_only_their_bits() {
    let mut regs = Regs::default();
    regs.set_ctrl_storage(3);
    regs.set_ctrl_raw(0xff);

    assert_eq!(0xf, regs.get_ctrl_raw());
    assert_eq!(3, regs.get_ctrl_storage());

    regs.write_ctrl(0xf000);
    regs.set_ctrl_mode(Mode::on);
    assert_eq!(0xf, regs.get_ctrl_status());
    assert_eq!(Mode::on, regs.get_ctrl_mode());
  }

  #[test]
  fn single_bit_set_clear_toggle() {
    let mut regs = Regs::default();
    regs.set_ctrl_en();
    assert_eq!(1, regs.get_ctrl_en());
    regs.toggle_ctrl_en();
    assert_eq!(0, regs.get_ctrl_en());
    regs.toggle_ctrl_en();
    regs.clear_ctrl_en();
    assert_eq!(0, regs.read_ctrl());
  }

  #[test]
  fn array_storage_takes_an_index() {
    let mut regs = Regs::default();
    regs.set_count_hi(1, 0xab);
    regs.set_all_count(0, 0x12, 0x34);

    assert_eq!((0x12, 0x34), regs.get_all_count(0));
    assert_eq!((0, 0xab), regs.get_all_count(1));
    assert_eq!(0, regs.get_count_lo(1));
  }

  #[test]
  fn volatile_access_at_every_alignment() {
    let mut regs = [Regs::default(); 4];
    for (i, r) in regs.iter_mut().enumerate() {
      let value = 0x1122_3344u32.wrapping_add(i as u32);
      r.write_ctrl(value);
      assert_eq!(value, r.read_ctrl());
    }
  }

  #[test]
  fn swapped_codec_reverses_multi_byte_fields() {
    let mut regs = Regs::default();
    regs.write_ctrl(0x0102_0304);
    regs.set_all_count(1, 0x56, 0x78);

    let mut buffer = [0u8; Regs::SIZE];
    assert_eq!(Regs::SIZE, regs.encode_swapped(&mut buffer));
    assert_eq!(0x0102_0304u32.swap_bytes().to_ne_bytes(), buffer[1..5]);
    assert_eq!(0x7856u16.swap_bytes().to_ne_bytes(), buffer[14..16]);

    let mut decoded = Regs::default();
    assert_eq!(Regs::SIZE, decoded.decode_swapped(&buffer));
    assert_eq!(regs, decoded);

    let mut native = [0u8; Regs::SIZE];
    regs.encode(&mut native, Endianness::NATIVE);
    assert_eq!(regs.raw_ro(), &native);
  }

  #[test]
  fn enum_names() {
    assert_eq!("fast", Mode::fast.to_string());
    assert_eq!("UNKNOWN Mode", Mode(3).to_string());
    assert_eq!(Ok(Mode::on), "on".parse::<Mode>());
    assert!("ON".parse::<Mode>().is_err());
  }
}
"#;

fn write_project(root: &Path) {
  fs::create_dir_all(root.join("src")).unwrap();
  fs::write(root.join("Cargo.toml"), MANIFEST).unwrap();
  fs::write(root.join("src").join("lib.rs"), CHECKS).unwrap();
}

#[test]
fn generated_sources_compile_and_pass() {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path();
  write_project(root);

  let config: Config = serde_json::from_str(DECLARATIONS).unwrap();
  let registry = TypeRegistry::from_config(&config).unwrap();
  generate(&registry, &root.join("src").join("generated"), 2).unwrap();

  let output = Command::new(env!("CARGO"))
    .args(["test", "--offline", "--quiet"])
    .current_dir(root)
    .env("CARGO_TARGET_DIR", root.join("target"))
    .output()
    .unwrap();

  assert!(
    output.status.success(),
    "generated crate failed\nstdout:\n{}\nstderr:\n{}",
    String::from_utf8_lossy(&output.stdout),
    String::from_utf8_lossy(&output.stderr)
  );
}
