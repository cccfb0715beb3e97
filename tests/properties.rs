// SPDX-License-Identifier: Apache-2.0

//! Whole-engine invariants: idempotence, identity on marker-free input, and
//! preservation when expansion cannot proceed.

use std::path::PathBuf;

use svautos::{Analyzer, Config, ModuleCatalog};

fn expand(src: &str) -> String {
    let config = Config {
        elaborate: false,
        ..Config::default()
    };
    let mut analyzer = Analyzer::from_source(PathBuf::from("test.sv"), src.to_string(), config)
        .expect("fixture must parse");
    let mut catalog = ModuleCatalog::new();
    analyzer.register_modules(&mut catalog);
    analyzer.analyze(&catalog).text
}

const MIXED_FIXTURE: &str = "\
module top (
  /*AUTOPORTS*/
);
  /*AUTOLOGIC*/
  producer u_prod (/*AUTOINST*/);
  consumer u_cons (/*AUTOINST*/);
endmodule

module producer (
  input logic clk,
  output logic [7:0] data_out,
  output logic data_valid
);
endmodule

module consumer (
  input logic clk,
  input logic [7:0] data_out,
  input logic data_valid,
  output logic [7:0] result
);
endmodule
";

const TEMPLATE_FIXTURE: &str = r#"module top;
  /* fifo AUTO_TEMPLATE "u_fifo_(\d+)"
     din => fifo_%1_din
     dout => fifo_%1_dout
  */
  fifo u_fifo_0 (
    .clk(clk),
    /*AUTOINST*/
  );
  fifo u_fifo_1 (
    .clk(clk),
    /*AUTOINST*/
  );
endmodule

module fifo (
  input logic clk,
  input logic [7:0] din,
  output logic [7:0] dout
);
endmodule
"#;

const WIDTH_FIXTURE: &str = "\
module top;
  /*AUTOLOGIC*/
  wide_src u_src (/*AUTOINST*/);
  narrow_sink u_sink (/*AUTOINST*/);
endmodule

module wide_src (
  output logic [7:0] bus
);
endmodule

module narrow_sink (
  input logic [3:0] bus
);
endmodule
";

#[test]
fn expansion_is_idempotent() {
    for fixture in [MIXED_FIXTURE, TEMPLATE_FIXTURE, WIDTH_FIXTURE] {
        let once = expand(fixture);
        let twice = expand(&once);
        assert_eq!(once, twice, "second expansion must be a no-op");
    }
}

#[test]
fn file_without_markers_is_identity() {
    let src = "\
module plain (
  input logic clk,
  output logic [3:0] count
);
  sub u0 (.clk(clk), .count(count));
endmodule

module sub (
  input logic clk,
  output logic [3:0] count
);
endmodule
";
    assert_eq!(expand(src), src);
}

#[test]
fn unresolved_markers_preserve_input_when_lenient() {
    let src = "\
module top;
  ghost u0 (/*AUTOINST*/);
  phantom u1 (/*AUTOINST*/);
endmodule
";
    assert_eq!(expand(src), src);
}

#[test]
fn multi_instance_expansion_resolves_each_instance() {
    let out = expand(TEMPLATE_FIXTURE);
    assert!(out.contains(".din  (fifo_0_din)"));
    assert!(out.contains(".dout (fifo_0_dout)"));
    assert!(out.contains(".din  (fifo_1_din)"));
    assert!(out.contains(".dout (fifo_1_dout)"));
}

#[test]
fn reexpansion_after_port_removal_rewrites_stale_connections() {
    // First expansion against the original fifo.
    let once = expand(TEMPLATE_FIXTURE);
    // The user renames a template rule afterwards; the next run must
    // replace the stale generated connections rather than append.
    let edited = once.replace("din => fifo_%1_din", "din => new_%1_din");
    let twice = expand(&edited);
    assert!(twice.contains(".din  (new_0_din)"));
    assert!(!twice.contains(".din  (fifo_0_din)"));
    assert_eq!(twice.matches(".din").count(), 2);
}

#[test]
fn fence_reexpansion_is_stable() {
    let once = expand(WIDTH_FIXTURE);
    assert_eq!(once.matches("// Beginning of automatic logic").count(), 1);
    let twice = expand(&once);
    assert_eq!(twice.matches("// Beginning of automatic logic").count(), 1);
    assert_eq!(once, twice);
}

#[test]
fn generated_declarations_are_unique() {
    let out = expand(WIDTH_FIXTURE);
    let fence_start = out.find("// Beginning of automatic logic").unwrap();
    let fence_end = out.find("// End of automatics").unwrap();
    let decls: Vec<&str> = out[fence_start..fence_end]
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let mut unique = decls.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(decls.len(), unique.len());
}
