//! End-to-end programs run through the public interpreter API.

use std::cell::RefCell;
use std::rc::Rc;

use grunt::script::{ArgMap, ErrorKind, EvalError, Handlers, Interpreter, Pin, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Cmd(String, ArgMap),
    WritePin(Pin, f64),
    WriteMsg(String),
}

type Log = Rc<RefCell<Vec<Call>>>;

fn recorder(mnemonics: &[&'static str]) -> (Handlers, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut h = Handlers::new();
    for &m in mnemonics {
        let log = Rc::clone(&log);
        h.register_command(m, move |args| {
            log.borrow_mut().push(Call::Cmd(m.to_owned(), args.clone()));
        });
    }
    let pins = Rc::clone(&log);
    let msgs = Rc::clone(&log);
    let h = h
        .on_write_pin(move |pin, v| pins.borrow_mut().push(Call::WritePin(pin.clone(), v)))
        .on_write_msg(move |m| msgs.borrow_mut().push(Call::WriteMsg(m.to_owned())));
    (h, log)
}

fn run(src: &str) -> (Interpreter, Vec<Call>) {
    let (h, log) = recorder(&["G0", "G1", "G14", "M2"]);
    let mut interp = Interpreter::new(h);
    interp
        .run(src)
        .unwrap_or_else(|e| panic!("program failed: {e}\n{src}"));
    let calls = log.borrow().clone();
    (interp, calls)
}

fn args(pairs: &[(char, f64)]) -> ArgMap {
    pairs.iter().map(|&(k, v)| (k, Value::Number(v))).collect()
}

fn g1(pairs: &[(char, f64)]) -> Call {
    Call::Cmd("G1".into(), args(pairs))
}

fn var(interp: &Interpreter, name: &str) -> Value {
    interp
        .var(name)
        .cloned()
        .unwrap_or_else(|| panic!("{name} is not set"))
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn scenario_a_assignment() {
    let (i, _) = run("#1 = 5\n#2 = [#1 + 3]");
    assert_eq!(var(&i, "#1"), Value::Number(5.0));
    assert_eq!(var(&i, "#2"), Value::Number(8.0));
}

#[test]
fn scenario_b_command_arguments() {
    let (_, calls) = run("G1 X10 Y20 F100");
    assert_eq!(calls, vec![g1(&[('X', 10.0), ('Y', 20.0), ('F', 100.0)])]);
}

#[test]
fn scenario_c_macro_call() {
    let (_, calls) = run("MACRO m\nG1 X[$1]\nENDMACRO\nCALL m 7");
    assert_eq!(calls, vec![g1(&[('X', 7.0)])]);
}

#[test]
fn scenario_d_macro_in_loop() {
    let src = "MACRO m\nG1 X[$1]\nENDMACRO\n#s=100\nFOR #i 1 3\nCALL m #i\nENDFOR";
    let (_, calls) = run(src);
    assert_eq!(
        calls,
        vec![g1(&[('X', 1.0)]), g1(&[('X', 2.0)]), g1(&[('X', 3.0)])]
    );
}

#[test]
fn scenario_e_pin_write() {
    let (_, calls) = run("#sensor_value = 42.0\nWRITE 1 [#sensor_value]");
    assert_eq!(calls, vec![Call::WritePin(Pin::Number(1), 42.0)]);
}

#[test]
fn scenario_f_message_interpolation() {
    let (_, calls) = run("#1 = 5.0\nWRITE \"value is [#1]\"");
    assert_eq!(calls, vec![Call::WriteMsg("value is 5.0".into())]);
}

// ── Nested blocks ─────────────────────────────────────────────────────────────

#[test]
fn for_inside_for() {
    let src = "\
FOR #i 1 2
  FOR #j 1 2
    G1 X[#i] Y[#j]
  ENDFOR
ENDFOR
M2";
    let (_, calls) = run(src);
    assert_eq!(
        calls,
        vec![
            g1(&[('X', 1.0), ('Y', 1.0)]),
            g1(&[('X', 1.0), ('Y', 2.0)]),
            g1(&[('X', 2.0), ('Y', 1.0)]),
            g1(&[('X', 2.0), ('Y', 2.0)]),
            Call::Cmd("M2".into(), ArgMap::new()),
        ]
    );
}

#[test]
fn while_inside_for() {
    let src = "\
#total = 0
FOR #i 1 3
  #k = 0
  WHILE [#k LT #i]
    #k = #k + 1
    #total = #total + 1
  ENDWHILE
ENDFOR";
    let (i, _) = run(src);
    assert_eq!(var(&i, "#total"), Value::Number(6.0));
}

#[test]
fn while_inside_while() {
    let src = "\
#t = 0
#a = 0
WHILE [#a LT 2]
  #b = 0
  WHILE [#b LT 3]
    #t = #t + 1
    #b = #b + 1
  ENDWHILE
  #a = #a + 1
ENDWHILE";
    let (i, _) = run(src);
    assert_eq!(var(&i, "#t"), Value::Number(6.0));
    assert_eq!(var(&i, "#b"), Value::Number(3.0));
}

#[test]
fn if_inside_loop_with_elseif() {
    let src = "\
FOR #i 1 4
  IF #i EQ 1
    G1 X1
  ELSEIF #i EQ 2
    G1 X2
  ELSE
    IF #i GT 3
      G1 X4
    ENDIF
  ENDIF
ENDFOR";
    let (_, calls) = run(src);
    assert_eq!(
        calls,
        vec![g1(&[('X', 1.0)]), g1(&[('X', 2.0)]), g1(&[('X', 4.0)])]
    );
}

#[test]
fn assignments_in_nested_bodies_are_global() {
    let src = "\
MACRO bump
  #hits = #hits + 1
ENDMACRO
#hits = 0
IF 1
  FOR #i 1 2
    WHILE [#i GT 0]
      CALL bump
      #i = 0
    ENDWHILE
  ENDFOR
ENDIF";
    let (i, _) = run(src);
    assert_eq!(var(&i, "#hits"), Value::Number(2.0));
}

#[test]
fn loop_variable_reassignment_does_not_change_iteration_count() {
    let (_, calls) = run("FOR #i 1 3\n#i = 100\nG0\nENDFOR");
    assert_eq!(calls.len(), 3);
}

#[test]
fn macro_recursion_builds_sequence() {
    let src = "\
MACRO count
  G1 X[$1]
  IF $1 LT 3
    CALL count [$1 + 1]
  ENDIF
ENDMACRO
CALL count 1";
    let (_, calls) = run(src);
    assert_eq!(
        calls,
        vec![g1(&[('X', 1.0)]), g1(&[('X', 2.0)]), g1(&[('X', 3.0)])]
    );
}

#[test]
fn full_example_program() {
    let src = r#"
; Initialize variables
#1 = 0
#2 = 3
#speed = 100

MACRO move_to
    G1 X[$1] Y[$2] F[#speed]
ENDMACRO

IF [#1 LT #2]
    G1 X10 Y20 F[#speed] ; starting position
ENDIF

FOR #i 1 3
    CALL move_to #i 10.0
    #speed = [#speed + 20]
ENDFOR

WHILE [#1 LE #2]
    CALL move_to #1 [#1 * 2]
    #1 = [#1 + 1]
ENDWHILE

#sensor_value = [READ 7]
G14 S100 C16
WRITE 1 [#sensor_value]
WRITE "Operation complete"
#command = [RECV 10]
WRITE [#command]
G1 X50 Y75 F200
M2
"#;
    let (h, log) = recorder(&["G1", "G14", "M2"]);
    let h = h
        .on_read(|_| 123.45)
        .on_recv(|_| Some("received_command".to_owned()));
    let mut interp = Interpreter::new(h);
    interp.run(src).unwrap();

    let calls = log.borrow();
    assert_eq!(calls[0], g1(&[('X', 10.0), ('Y', 20.0), ('F', 100.0)]));
    assert_eq!(calls[1], g1(&[('X', 1.0), ('Y', 10.0), ('F', 100.0)]));
    assert_eq!(calls[3], g1(&[('X', 3.0), ('Y', 10.0), ('F', 140.0)]));
    // Bracketed CALL arguments are truncated to integers before substitution.
    assert_eq!(calls[4], g1(&[('X', 0.0), ('Y', 0.0), ('F', 160.0)]));
    assert_eq!(calls[7], g1(&[('X', 3.0), ('Y', 6.0), ('F', 160.0)]));
    assert_eq!(
        calls[8],
        Call::Cmd("G14".into(), args(&[('S', 100.0), ('C', 16.0)]))
    );
    assert_eq!(calls[9], Call::WritePin(Pin::Number(1), 123.45));
    assert_eq!(calls[10], Call::WriteMsg("Operation complete".into()));
    assert_eq!(calls[11], Call::WriteMsg("received_command".into()));
    assert_eq!(calls[12], g1(&[('X', 50.0), ('Y', 75.0), ('F', 200.0)]));
    assert_eq!(calls[13], Call::Cmd("M2".into(), ArgMap::new()));
    assert_eq!(calls.len(), 14);
}

// ── Macro bodies ──────────────────────────────────────────────────────────────

// Bracket groups in a macro body are evaluated once, when CALL expands it,
// not each time the expanded line runs.

#[test]
fn macro_loop_sees_bracket_values_from_call_time() {
    let src = "\
#i = 7
MACRO m
  FOR #i 1 3
    G1 X[#i]
  ENDFOR
ENDMACRO
CALL m";
    let (_, calls) = run(src);
    assert_eq!(calls, vec![g1(&[('X', 7.0)]); 3]);
}

#[test]
fn macro_loop_variable_in_brackets_must_exist_at_call() {
    let (h, log) = recorder(&["G1"]);
    let mut interp = Interpreter::new(h);
    let src = "\
MACRO m
  FOR #i 1 3
    G1 X[#i]
  ENDFOR
ENDMACRO
CALL m";
    let err = interp.run(src).unwrap_err();
    assert_eq!(err.line, Some(6));
    assert_eq!(
        err.kind,
        ErrorKind::Eval(EvalError::UndefinedVariable("#i".into()))
    );
    assert!(log.borrow().is_empty());
}

#[test]
fn macro_while_condition_is_expanded_away() {
    let (h, _) = recorder(&[]);
    let mut interp = Interpreter::new(h);
    let src = "\
#c = 0
MACRO m
  WHILE [#c LT 3]
    #c = #c + 1
  ENDWHILE
ENDMACRO
CALL m";
    // The body runs as `WHILE 1.0`, which has no bracketed condition.
    let err = interp.run(src).unwrap_err();
    assert_eq!(err.line, Some(3));
    assert!(matches!(err.kind, ErrorKind::Syntax(_)), "{err}");
    assert_eq!(interp.var("#c"), Some(&Value::Number(0.0)));
}

#[test]
fn macro_loop_driven_by_parameters() {
    let src = "\
MACRO row
  FOR #k 1 $1
    G0
  ENDFOR
ENDMACRO
CALL row 2
CALL row 3";
    let (_, calls) = run(src);
    assert_eq!(calls.len(), 5);
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[test]
fn failure_keeps_earlier_side_effects() {
    let (h, log) = recorder(&["G1"]);
    let mut interp = Interpreter::new(h);
    let err = interp.run("#a = 1\nG1 X1\n#b = 1 / 0\nG1 X2").unwrap_err();
    assert_eq!(err.line, Some(3));
    assert_eq!(err.to_string(), "line 3: division by zero");
    assert_eq!(interp.var("#a"), Some(&Value::Number(1.0)));
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn structural_errors_name_the_keyword() {
    let (h, _) = recorder(&[]);
    let mut interp = Interpreter::new(h);
    let err = interp.run("WHILE [1]\nG1").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Unterminated { keyword: "WHILE", terminator: "ENDWHILE" }
    );
    assert_eq!(err.to_string(), "line 1: WHILE block is missing its ENDWHILE");
}

#[test]
fn soft_failures_collected() {
    let mut interp = Interpreter::new(Handlers::new());
    interp.run("G1 X1\nM3\nWRITE hello\nx = 4").unwrap();
    let diags = interp.take_diagnostics();
    assert_eq!(diags.len(), 4);
    assert!(interp.diagnostics.is_empty());
}
