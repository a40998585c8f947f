//! End-to-end tests: source through the compiler and the stack machine.

use hipo_engine::compiler::{Bytecode, OpCode};
use hipo_engine::vm::{Fault, HaltReason, VM};
use hipo_engine::{Engine, Error};

/// Compiles and runs a program, returning the result and everything printed.
fn run_source(source: &str, input: &str) -> (Result<HaltReason, Error>, String) {
    let mut output = Vec::new();
    let result = Engine::new()
        .eval(source, &mut input.as_bytes(), &mut output)
        .map(|completion| completion.reason);
    (result, String::from_utf8(output).expect("utf-8 output"))
}

fn run_ok(source: &str) -> String {
    let (result, output) = run_source(source, "");
    assert_eq!(result.expect("program should run"), HaltReason::Halted);
    output
}

fn compile(source: &str) -> Bytecode {
    Engine::new().compile(source).expect("should compile").bytecode
}

#[test]
fn test_scenario_sum_of_globals() {
    let output = run_ok("<?php $x = 5; $y = 3; echo $x + $y . PHP_EOL; ?>");
    assert_eq!(output, "[Saida] 8\n");
}

#[test]
fn test_scenario_if_else() {
    let source = "<?php
        $x = -1;
        if ($x > 0) { echo 1 . PHP_EOL; } else { echo 0 . PHP_EOL; }
    ?>";
    assert_eq!(run_ok(source), "[Saida] 0\n");
}

#[test]
fn test_scenario_while_loop() {
    let source = "<?php
        $i = 0;
        while ($i < 3) {
            echo $i . PHP_EOL;
            $i = $i + 1;
        }
    ?>";
    assert_eq!(run_ok(source), "[Saida] 0\n[Saida] 1\n[Saida] 2\n");
}

#[test]
fn test_scenario_function_call() {
    let source = "<?php
        $p = 2;
        $q = 4;
        function soma($a, $b) {
            $r = $a + $b;
            echo $r . PHP_EOL;
        }
        soma($p, $q);
        $p = 10;
        soma($p, $q);
    ?>";
    assert_eq!(run_ok(source), "[Saida] 6\n[Saida] 14\n");
}

#[test]
fn test_call_through_variable_syntax() {
    let source = "<?php
        $v = 9;
        function show($a) { echo $a . PHP_EOL; }
        $show($v);
    ?>";
    assert_eq!(run_ok(source), "[Saida] 9\n");
}

#[test]
fn test_function_leaves_globals_intact() {
    let source = "<?php
        $g = 1;
        function bump($a) {
            $t = 100;
            echo $t . PHP_EOL;
            $a = $a + $t;
            echo $a . PHP_EOL;
        }
        bump($g);
        echo $g . PHP_EOL;
    ?>";
    assert_eq!(run_ok(source), "[Saida] 100\n[Saida] 101\n[Saida] 1\n");
}

#[test]
fn test_read_input() {
    let source = "<?php $n = floatval(readline()); echo $n * 2 . PHP_EOL; ?>";
    let (result, output) = run_source(source, "21\n");
    assert!(result.is_ok());
    assert_eq!(output, "[Entrada $n] [Saida] 42\n");
}

#[test]
fn test_malformed_input_reads_as_zero() {
    let source = "<?php $n = floatval(readline()); echo $n + 1 . PHP_EOL; ?>";
    let (result, output) = run_source(source, "not a number\n");
    assert!(result.is_ok());
    assert_eq!(output, "[Entrada $n] [Saida] 1\n");
}

#[test]
fn test_end_of_input_faults() {
    let source = "<?php $n = floatval(readline()); echo $n . PHP_EOL; ?>";
    let (result, output) = run_source(source, "");
    assert!(matches!(result, Err(Error::Fault(Fault::EndOfInput { .. }))));
    assert_eq!(output, "[Entrada $n] ");
}

#[test]
fn test_division_by_zero_stops_the_run() {
    let source = "<?php
        $a = 1;
        $b = 0;
        echo 5 . PHP_EOL;
        echo $a / $b . PHP_EOL;
        echo 7 . PHP_EOL;
    ?>";
    let (result, output) = run_source(source, "");
    assert!(matches!(result, Err(Error::Fault(Fault::DivisionByZero { .. }))));
    assert_eq!(output, "[Saida] 5\n");
}

#[test]
fn test_logic_and_fractions() {
    let source = "<?php
        $a = 3;
        $b = 0.5;
        if ($a > 2 && !($b > 1)) { echo $a * $b . PHP_EOL; }
        if ($a < 2 || $b == 0.5) { echo -$a . PHP_EOL; }
    ?>";
    assert_eq!(run_ok(source), "[Saida] 1.5\n[Saida] -3\n");
}

#[test]
fn test_call_expression_value_is_zero() {
    let source = "<?php
        $v = 4;
        function show($a) { echo $a . PHP_EOL; }
        echo show($v) + 1 . PHP_EOL;
    ?>";
    assert_eq!(run_ok(source), "[Saida] 4\n[Saida] 1\n");
}

#[test]
fn test_globals_only_addresses_stay_in_range() {
    let source = "<?php
        $a = 1; $b = 2; $c;
        $c = $a + $b;
        while ($c > 0) { $c = $c - 1; }
        echo $c . PHP_EOL;
    ?>";
    let bytecode = compile(source);
    let allocs = bytecode
        .instructions
        .iter()
        .filter(|i| i.opcode == OpCode::Alloc)
        .count();
    assert_eq!(allocs, 3);
    for instruction in &bytecode.instructions {
        if matches!(instruction.opcode, OpCode::Load | OpCode::Store) {
            let address = instruction.operand.expect("address operand");
            assert!((0.0..3.0).contains(&address), "{} out of range", instruction);
        }
    }
}

#[test]
fn test_dealloc_matches_parameters_plus_locals() {
    let cases = [
        ("function f() { }", None),
        ("function f($a) { }", Some(1.0)),
        ("function f() { $x; }", Some(1.0)),
        ("function f($a, $b) { $x; $y = 2; $z; }", Some(5.0)),
    ];
    for (function, expected) in cases {
        let bytecode = compile(&format!("<?php {} ?>", function));
        let dealloc = bytecode
            .instructions
            .iter()
            .find(|i| i.opcode == OpCode::Dealloc)
            .and_then(|i| i.operand);
        assert_eq!(dealloc, expected, "{}", function);
    }
}

#[test]
fn test_bytecode_round_trip_through_file() {
    let source = "<?php
        $p = floatval(readline());
        $q = 4;
        function soma($a, $b) { $r = $a + $b; echo $r . PHP_EOL; }
        soma($p, $q);
    ?>";
    let bytecode = compile(source);

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("program.hvm");
    bytecode.save(&path).expect("save");
    let reloaded = Bytecode::load_file(&path).expect("load");

    assert_eq!(reloaded, bytecode);
    let read = reloaded
        .instructions
        .iter()
        .find(|i| i.opcode == OpCode::Read)
        .expect("read instruction");
    assert_eq!(read.comment.as_deref(), Some("$p"));

    let mut output = Vec::new();
    VM::new()
        .run(&reloaded, &mut "2.5\n".as_bytes(), &mut output)
        .expect("run");
    assert_eq!(String::from_utf8(output).unwrap(), "[Entrada $p] [Saida] 6.5\n");
}

#[test]
fn test_tolerated_conditions() {
    // Underflow, out-of-range load, empty return stack and a bad argument
    let text = "INPP\nSOMA\nIMPR\nCRVL 99\nIMPR\nRTPR\nCRCT oops\nIMPR\nPARA\n";
    let bytecode = Bytecode::parse(text);
    let mut output = Vec::new();
    let completion = VM::new()
        .run(&bytecode, &mut "".as_bytes(), &mut output)
        .expect("tolerated conditions never fault");
    assert_eq!(completion.reason, HaltReason::Halted);
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "[Saida] 0\n[Saida] 0\n[Saida] 0\n"
    );
}

#[test]
fn test_unknown_opcode_loads_but_faults() {
    let bytecode = Bytecode::parse("INPP\nCRCT 1\nIMPR\nWHAT 2\nCRCT 2\nIMPR\n");
    assert_eq!(bytecode.len(), 6);

    let mut output = Vec::new();
    let result = VM::new().run(&bytecode, &mut "".as_bytes(), &mut output);
    assert!(matches!(result, Err(Fault::UnknownOpcode { pc: 3, .. })));
    assert_eq!(String::from_utf8(output).unwrap(), "[Saida] 1\n");
}

#[test]
fn test_negative_address_decoding() {
    // -1 decodes to slot 0, -2 to slot 1
    let bytecode = Bytecode::parse("ALME 2\nCRCT 5\nARMZ -2\nCRVL -2\nIMPR\nCRVL -1\nIMPR\n");
    let mut output = Vec::new();
    VM::new()
        .run(&bytecode, &mut "".as_bytes(), &mut output)
        .expect("run");
    assert_eq!(String::from_utf8(output).unwrap(), "[Saida] 5\n[Saida] 0\n");
}

#[test]
fn test_running_off_the_end_is_a_halt() {
    let bytecode = Bytecode::parse("CRCT 3\nIMPR");
    let mut output = Vec::new();
    let completion = VM::new()
        .run(&bytecode, &mut "".as_bytes(), &mut output)
        .expect("run");
    assert_eq!(completion.reason, HaltReason::EndOfProgram);
}
