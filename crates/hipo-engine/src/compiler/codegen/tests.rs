//! Tests for the bytecode compiler.

use super::*;
use crate::parser::parse;
use crate::semantic::analyze;

fn compile_source(src: &str) -> Result<Bytecode, CodegenError> {
    let program = parse(src).expect("Should parse");
    let analysis = analyze(&program).expect("Should analyze");
    let mut compiler = Compiler::with_analysis(analysis);
    compiler.generate(&program)
}

fn compile_ok(src: &str) -> Bytecode {
    compile_source(src).expect("Compilation should succeed")
}

fn text(src: &str) -> Vec<String> {
    compile_ok(src)
        .instructions
        .iter()
        .map(|instruction| instruction.to_string())
        .collect()
}

#[test]
fn test_compiler_default() {
    let compiler = Compiler::default();
    assert!(compiler.bytecode.instructions.is_empty());
}

#[test]
fn test_compile_empty_program() {
    assert_eq!(text("<?php ?>"), vec!["INPP", "PARA"]);
}

#[test]
fn test_compile_globals() {
    assert_eq!(
        text("<?php $x = 5; $y = 3; echo $x + $y . PHP_EOL; ?>"),
        vec![
            "INPP", "ALME 1", "ALME 1", "CRCT 5", "ARMZ 0", "CRCT 3", "ARMZ 1", "CRVL 0",
            "CRVL 1", "SOMA", "IMPR", "PARA",
        ]
    );
}

#[test]
fn test_zero_initializer_skipped() {
    assert_eq!(
        text("<?php $i = 0; $j = 0.5; ?>"),
        vec!["INPP", "ALME 1", "ALME 1", "CRCT 0.5", "ARMZ 1", "PARA"]
    );
}

#[test]
fn test_read_assignment_is_annotated() {
    assert_eq!(
        text("<?php $n = floatval(readline()); $m; $m = floatval(readline()); ?>"),
        vec!["INPP", "ALME 1", "ALME 1", "LEIT #$n", "ARMZ 0", "LEIT #$m", "ARMZ 1", "PARA"]
    );
}

#[test]
fn test_read_inside_expression_is_plain() {
    // $m; $m = read + 1; (not expressible in source)
    let program = Program {
        body: Body {
            declarations: vec![Declaration::Var(VarDecl { name: "$m".into(), initializer: None })],
            statements: vec![Statement::Assign(Assignment {
                name: "$m".into(),
                expr: Expr::binary(BinaryOp::Add, Expr::Read, Expr::Number(1.0)),
            })],
        },
    };
    let analysis = analyze(&program).expect("Should analyze");
    let listing: Vec<String> = Compiler::with_analysis(analysis)
        .generate(&program)
        .expect("Compilation should succeed")
        .instructions
        .iter()
        .map(|instruction| instruction.to_string())
        .collect();
    assert_eq!(
        listing,
        vec!["INPP", "ALME 1", "LEIT", "CRCT 1", "SOMA", "ARMZ 0", "PARA"]
    );
}

#[test]
fn test_compile_unary() {
    assert_eq!(
        text("<?php $a; if (!($a > 1)) { echo -$a . PHP_EOL; } ?>"),
        vec![
            "INPP", "ALME 1", "CRVL 0", "CRCT 1", "CPMA", "NEGA", "DSVF 10", "CRVL 0", "INVE",
            "IMPR", "PARA",
        ]
    );
}

#[test]
fn test_compile_binary_opcodes() {
    let src = "<?php $a; $b; \
        if ($a == $b || $a != $b && $a >= $b) { } \
        if ($a <= $b || $a > $b || $a < $b) { } \
        echo $a - $b * $b / $a . PHP_EOL; ?>";
    let listing = text(src);
    for mnemonic in [
        "CPIG", "CDES", "CMAI", "CONJ", "DISJ", "CPMI", "CPMA", "CPME", "SUBT", "MULT", "DIVI",
    ] {
        assert!(listing.iter().any(|line| line == mnemonic), "missing {}", mnemonic);
    }
}

#[test]
fn test_if_else_backpatching() {
    assert_eq!(
        text("<?php $x; if ($x > 0) { echo 1 . PHP_EOL; } else { echo 0 . PHP_EOL; } ?>"),
        vec![
            "INPP",    // 0
            "ALME 1",  // 1
            "CRVL 0",  // 2
            "CRCT 0",  // 3
            "CPMA",    // 4
            "DSVF 9",  // 5
            "CRCT 1",  // 6
            "IMPR",    // 7
            "DSVI 11", // 8
            "CRCT 0",  // 9
            "IMPR",    // 10
            "PARA",    // 11
        ]
    );
}

#[test]
fn test_while_backpatching() {
    assert_eq!(
        text("<?php $i = 0; while ($i < 3) { $i = $i + 1; } ?>"),
        vec![
            "INPP",    // 0
            "ALME 1",  // 1
            "CRVL 0",  // 2
            "CRCT 3",  // 3
            "CPME",    // 4
            "DSVF 11", // 5
            "CRVL 0",  // 6
            "CRCT 1",  // 7
            "SOMA",    // 8
            "ARMZ 0",  // 9
            "DSVI 2",  // 10
            "PARA",    // 11
        ]
    );
}

#[test]
fn test_function_call_protocol() {
    let src = "<?php $p = 2; $q = 4; \
        function soma($a, $b) { $r = $a + $b; echo $r . PHP_EOL; } \
        soma($p, $q); ?>";
    assert_eq!(
        text(src),
        vec![
            "INPP",                 // 0
            "ALME 1",               // 1
            "ALME 1",               // 2
            "DSVI 13 #funcao soma", // 3
            "ALME 1",               // 4 entry
            "CRVL 2",               // 5
            "CRVL 3",               // 6
            "SOMA",                 // 7
            "ARMZ 4",               // 8
            "CRVL 4",               // 9
            "IMPR",                 // 10
            "DESM 3",               // 11
            "RTPR",                 // 12
            "CRCT 2",               // 13
            "ARMZ 0",               // 14
            "CRCT 4",               // 15
            "ARMZ 1",               // 16
            "PUSHER 21",            // 17
            "PARAM 0",              // 18
            "PARAM 1",              // 19
            "CHPR 4",               // 20
            "PARA",                 // 21
        ]
    );
}

#[test]
fn test_dealloc_only_when_slots_exist() {
    let listing = text("<?php function f() { echo 1 . PHP_EOL; } f(); ?>");
    assert!(!listing.iter().any(|line| line.starts_with("DESM")));

    let listing = text("<?php function g($a) { $b; $c; } $v; g($v); ?>");
    assert!(listing.iter().any(|line| line == "DESM 3"));
}

#[test]
fn test_call_expression_leaves_one_value() {
    let listing = text("<?php $v; function f($a) { } echo f($v) . PHP_EOL; ?>");
    let call = listing.iter().position(|line| line.starts_with("CHPR")).unwrap();
    assert_eq!(listing[call + 1], "CRCT 0");
    assert_eq!(listing[call + 2], "IMPR");
}

#[test]
fn test_non_variable_argument() {
    let err = compile_source("<?php function f($a) { } f(1 + 2); ?>").unwrap_err();
    assert_eq!(err, CodegenError::NonVariableArgument { function: "f".into() });
    assert!(err.to_string().starts_with("call requires simple variable arguments"));
}

#[test]
fn test_backpatch_placeholders_are_filled() {
    let src = "<?php $i = 0; \
        function f($a) { if ($a > 1) { echo $a . PHP_EOL; } } \
        function g($b) { while ($b > 0) { $b = $b - 1; } } \
        while ($i < 2) { f($i); g($i); $i = $i + 1; } ?>";
    let bytecode = compile_ok(src);
    for (address, instruction) in bytecode.instructions.iter().enumerate() {
        if matches!(
            instruction.opcode,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::PushReturn | OpCode::Call
        ) {
            let target = instruction.operand.unwrap();
            assert!(target > 0.0, "unpatched placeholder at {}", address);
            assert!((target as usize) <= bytecode.len());
        }
    }
}

#[test]
fn test_local_addresses_sit_above_globals() {
    let src = "<?php $g1; $g2; $g3; function f($a) { $l = $a; } f($g1); ?>";
    let listing = text(src);
    // $a -> 3 + 0, $l -> 3 + 1
    assert!(listing.contains(&"CRVL 3".to_string()));
    assert!(listing.contains(&"ARMZ 4".to_string()));
}

#[test]
fn test_entry_addresses_reach_analysis() {
    let src = "<?php function f() { } function g() { } ?>";
    let program = parse(src).unwrap();
    let analysis = analyze(&program).unwrap();
    let mut compiler = Compiler::with_analysis(analysis);
    compiler.generate(&program).unwrap();

    assert_eq!(compiler.function_entry("f"), Some(2));
    assert_eq!(compiler.function_entry("g"), Some(4));

    let analysis = compiler.into_analysis();
    assert_eq!(analysis.global.lookup("g").and_then(|s| s.entry_address), Some(4));
}

#[test]
fn test_compiler_without_analysis() {
    let program = parse("<?php $a = 1; $b = 2; echo $a . PHP_EOL; ?>").unwrap();
    let bytecode = Compiler::new().generate(&program).unwrap();
    assert_eq!(bytecode.instructions[4].to_string(), "ARMZ 0");
    assert_eq!(bytecode.instructions[6].to_string(), "ARMZ 1");
}
