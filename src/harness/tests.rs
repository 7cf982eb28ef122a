use super::*;

use crate::channel::{ChannelArena, ChannelId};
use crate::error::{Error, ErrorKind};
use crate::toolchain::{ProcInstance, Spawned};
use crate::types::{ChannelDirection, ConcreteType, ConfigParam, FunctionSignature};

fn u8v(raw: u128) -> Value {
    Value::ubits(8, raw)
}

fn chan(name: &str, direction: ChannelDirection) -> ConfigParam {
    ConfigParam {
        name: name.to_owned(),
        ty: ConcreteType::Channel(Box::new(ConcreteType::unsigned(8)), direction),
    }
}

/// Stand-in toolchain: `add` adds two u8s, `P` forwards its first input to every
/// output (nothing for a zero) and counts ticks in its state.
struct MockToolchain {
    params: Vec<ConfigParam>,
    instances: usize,
    fail_emit: bool,
    fail_tick_at: Option<usize>,
    /// Fail the tick before its inputs are received.
    fail_early: bool,
    emit_calls: usize,
    interpret_calls: usize,
    spawn_calls: usize,
}

impl Default for MockToolchain {
    fn default() -> Self {
        Self {
            params: vec![
                chan("input", ChannelDirection::In),
                chan("output", ChannelDirection::Out),
            ],
            instances: 1,
            fail_emit: false,
            fail_tick_at: None,
            fail_early: false,
            emit_calls: 0,
            interpret_calls: 0,
            spawn_calls: 0,
        }
    }
}

struct MockInstance {
    ports: Vec<(ChannelId, ChannelDirection)>,
    ticks: usize,
    fail_tick_at: Option<usize>,
    fail_early: bool,
}

impl ProcInstance for MockInstance {
    fn name(&self) -> &str {
        "P"
    }

    fn tick(
        &mut self,
        channels: &mut ChannelArena,
        state: &[Value],
    ) -> crate::error::Result<Vec<Value>> {
        let tick = self.ticks;
        self.ticks += 1;
        if self.fail_early && self.fail_tick_at == Some(tick) {
            return Err(Error::runtime("tick exploded"));
        }
        let received: Vec<Value> = self
            .ports
            .iter()
            .filter(|(_, direction)| *direction == ChannelDirection::In)
            .filter_map(|(id, _)| channels.pop(*id))
            .collect();
        if self.fail_tick_at == Some(tick) {
            return Err(Error::runtime("tick exploded"));
        }
        let first = received
            .first()
            .filter(|v| v.as_bits().is_some_and(|b| b.is_true()));
        if let Some(first) = first {
            for (id, direction) in &self.ports {
                if *direction == ChannelDirection::Out {
                    channels.push(*id, first.clone());
                }
            }
        }
        let count = state[0].as_bits().map_or(0, |b| b.raw());
        Ok(vec![u8v(count + 1)])
    }
}

impl Toolchain for MockToolchain {
    type Module = ();
    type Function = String;
    type Proc = String;
    type Bytecode = String;
    type Instance = MockInstance;

    fn parse_and_typecheck(
        &mut self,
        _source: &str,
        _file: FileName,
    ) -> crate::error::Result<()> {
        Ok(())
    }

    fn find_member(&self, _module: &(), name: &str) -> Option<ModuleMember<String, String>> {
        match name {
            "add" => Some(ModuleMember::Function(name.to_owned())),
            "P" => Some(ModuleMember::Proc(name.to_owned())),
            "K" => Some(ModuleMember::Constant),
            _ => None,
        }
    }

    fn signature(
        &self,
        _module: &(),
        _function: &String,
    ) -> crate::error::Result<FunctionSignature> {
        Ok(FunctionSignature {
            params: vec![ConcreteType::unsigned(8), ConcreteType::unsigned(8)],
            ret: ConcreteType::unsigned(8),
        })
    }

    fn emit(&mut self, _module: &(), function: &String) -> crate::error::Result<String> {
        self.emit_calls += 1;
        if self.fail_emit {
            return Err(Error::emission(function.as_str(), "refused"));
        }
        Ok(function.clone())
    }

    fn interpret(&mut self, _bytecode: &String, args: &[Value]) -> crate::error::Result<Value> {
        self.interpret_calls += 1;
        let (Some(a), Some(b)) = (args[0].as_bits(), args[1].as_bits()) else {
            return Err(Error::runtime("not bits"));
        };
        Ok(Value::Bits(a.wrapping_add(b)))
    }

    fn config_params(
        &self,
        _module: &(),
        _proc: &String,
    ) -> crate::error::Result<Vec<ConfigParam>> {
        Ok(self.params.clone())
    }

    fn spawn(
        &mut self,
        _module: &(),
        _proc: &String,
        config_args: &[Value],
        initial_state: &[Value],
    ) -> crate::error::Result<Vec<Spawned<MockInstance>>> {
        self.spawn_calls += 1;
        let ports: Vec<_> = config_args
            .iter()
            .zip(&self.params)
            .filter_map(|(arg, param)| Some((arg.as_channel()?, param.ty.as_channel()?.1)))
            .collect();
        Ok((0..self.instances)
            .map(|_| Spawned {
                instance: MockInstance {
                    ports: ports.clone(),
                    ticks: 0,
                    fail_tick_at: self.fail_tick_at,
                    fail_early: self.fail_early,
                },
                initial_state: initial_state.to_vec(),
            })
            .collect())
    }
}

fn harness(toolchain: MockToolchain) -> BatchHarness<MockToolchain> {
    BatchHarness::new(toolchain, RunConfig::default())
}

fn tagged(toolchain: MockToolchain) -> BatchHarness<MockToolchain> {
    BatchHarness::new(
        toolchain,
        RunConfig::default().with_row_failures(RowFailurePolicy::TagRows),
    )
}

fn rows(values: &[u128]) -> Vec<Vec<Value>> {
    values.iter().map(|v| vec![u8v(*v)]).collect()
}

fn ok_rows<T: std::fmt::Debug>(results: Vec<crate::error::Result<T>>) -> Vec<T> {
    results.into_iter().map(|r| r.unwrap()).collect()
}

#[test]
fn function_batch_emits_once_and_preserves_order() {
    let mut harness = harness(MockToolchain::default());
    let batch = vec![vec![u8v(1), u8v(2)], vec![u8v(10), u8v(20)], vec![u8v(255), u8v(1)]];
    let results = ok_rows(harness.run_function("", "add", &batch).unwrap());
    assert_eq!(results, [u8v(3), u8v(30), u8v(0)]);
    assert_eq!(harness.toolchain().emit_calls, 1);
    assert_eq!(harness.toolchain().interpret_calls, 3);
}

#[test]
fn empty_function_batch_still_emits() {
    let mut harness = harness(MockToolchain::default());
    assert!(harness.run_function("", "add", &[]).unwrap().is_empty());
    assert_eq!(harness.toolchain().emit_calls, 1);
}

#[test]
fn emission_failure_runs_no_rows() {
    let mut harness = harness(MockToolchain {
        fail_emit: true,
        ..MockToolchain::default()
    });
    let error = harness
        .run_function("", "add", &[vec![u8v(1), u8v(2)]])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Emission);
    assert_eq!(harness.toolchain().interpret_calls, 0);
}

#[test]
fn bad_row_aborts_the_batch_by_default() {
    let mut harness = harness(MockToolchain::default());
    let batch = vec![vec![u8v(1), u8v(2)], vec![u8v(1)], vec![u8v(3), u8v(4)]];
    let error = harness.run_function("", "add", &batch).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Arity);
    assert_eq!(error.to_string(), "row 1: function `add` expects 2 values, got 1");
    assert_eq!(harness.toolchain().interpret_calls, 1);
}

#[test]
fn tagged_rows_keep_going() {
    let mut harness = tagged(MockToolchain::default());
    let batch = vec![
        vec![u8v(1), u8v(2)],
        vec![u8v(1), Value::ubits(16, 2)],
        vec![u8v(3), u8v(4)],
    ];
    let results = harness.run_function("", "add", &batch).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &u8v(3));
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::Conversion);
    assert_eq!(results[2].as_ref().unwrap(), &u8v(7));
}

#[test]
fn lookup_failures() {
    let mut harness = harness(MockToolchain::default());
    let error = harness.run_function("", "missing", &[]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Lookup);
    assert_eq!(error.to_string(), "module `batched` has no member named `missing`");

    let error = harness.run_function("", "P", &[]).unwrap_err();
    assert_eq!(error.to_string(), "`P` is a proc, but a function was requested");

    let error = harness.run_proc("", "K", &[], &[]).unwrap_err();
    assert_eq!(error.to_string(), "`K` is a constant, but a proc was requested");
    assert_eq!(harness.toolchain().emit_calls, 0);
    assert_eq!(harness.toolchain().spawn_calls, 0);
}

#[test]
fn proc_values_flow_in_fifo_order() {
    let mut harness = harness(MockToolchain::default());
    let results = ok_rows(harness.run_proc("", "P", &rows(&[7, 8, 9]), &[u8v(0)]).unwrap());
    let outputs: Vec<_> = results.iter().map(|row| row.outputs.clone()).collect();
    assert_eq!(outputs, [vec![u8v(7)], vec![u8v(8)], vec![u8v(9)]]);
    let states: Vec<_> = results.iter().map(|row| row.next_state.clone()).collect();
    assert_eq!(states, [vec![u8v(1)], vec![u8v(2)], vec![u8v(3)]]);
    assert_eq!(harness.toolchain().spawn_calls, 1);
}

#[test]
fn outputs_follow_declaration_order() {
    let params = vec![
        chan("a_out", ChannelDirection::Out),
        chan("x_in", ChannelDirection::In),
        chan("b_out", ChannelDirection::Out),
        chan("y_in", ChannelDirection::In),
    ];
    let mut harness = harness(MockToolchain {
        params,
        ..MockToolchain::default()
    });
    let batch = vec![vec![u8v(5), u8v(6)]];
    let results = ok_rows(harness.run_proc("", "P", &batch, &[u8v(0)]).unwrap());
    assert_eq!(results[0].outputs, [u8v(5), u8v(5)]);
}

#[test]
fn proc_input_arity_is_checked_before_spawning() {
    let mut harness = tagged(MockToolchain::default());
    let batch = vec![vec![u8v(1)], vec![u8v(1), u8v(2)]];
    let error = harness.run_proc("", "P", &batch, &[u8v(0)]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Arity);
    assert_eq!(harness.toolchain().spawn_calls, 0);
}

#[test]
fn non_channel_config_param_is_a_config_error() {
    let params = vec![
        chan("input", ChannelDirection::In),
        ConfigParam {
            name: "limit".to_owned(),
            ty: ConcreteType::unsigned(8),
        },
    ];
    let mut harness = harness(MockToolchain {
        params,
        ..MockToolchain::default()
    });
    let error = harness.run_proc("", "P", &rows(&[1]), &[u8v(0)]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Config);
    assert!(error.to_string().contains("`limit`"), "{error}");
    assert_eq!(harness.toolchain().spawn_calls, 0);
}

#[test]
fn exactly_one_instance_is_required() {
    for instances in [0, 2] {
        let mut harness = harness(MockToolchain {
            instances,
            ..MockToolchain::default()
        });
        let error = harness.run_proc("", "P", &rows(&[1]), &[u8v(0)]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
        assert!(error.to_string().contains("unsupported topology"), "{error}");
    }
}

#[test]
fn failed_tick_aborts_by_default() {
    let mut harness = harness(MockToolchain {
        fail_tick_at: Some(1),
        ..MockToolchain::default()
    });
    let error = harness.run_proc("", "P", &rows(&[1, 2, 3]), &[u8v(0)]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Runtime);
    assert_eq!(error.to_string(), "row 1: tick exploded");
}

#[test]
fn failed_tick_keeps_state_when_tagging() {
    let mut harness = tagged(MockToolchain {
        fail_tick_at: Some(1),
        ..MockToolchain::default()
    });
    let results = harness.run_proc("", "P", &rows(&[1, 2, 3]), &[u8v(0)]).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().next_state, [u8v(1)]);
    assert!(results[1].is_err());
    let last = results[2].as_ref().unwrap();
    assert_eq!(last.next_state, [u8v(2)]);
    assert_eq!(last.outputs, [u8v(3)]);
}

#[test]
fn failed_tick_drops_the_inputs_it_left_unread() {
    let mut harness = tagged(MockToolchain {
        fail_tick_at: Some(1),
        fail_early: true,
        ..MockToolchain::default()
    });
    let results = harness.run_proc("", "P", &rows(&[1, 2, 3]), &[u8v(0)]).unwrap();
    assert_eq!(results[0].as_ref().unwrap().outputs, [u8v(1)]);
    assert_eq!(results[1].as_ref().unwrap_err().to_string(), "row 1: tick exploded");
    assert_eq!(results[2].as_ref().unwrap().outputs, [u8v(3)]);
}

#[test]
fn empty_rows_are_kept_by_default() {
    let mut harness = harness(MockToolchain::default());
    let results = ok_rows(harness.run_proc("", "P", &rows(&[4, 0, 6]), &[u8v(0)]).unwrap());
    assert_eq!(results.len(), 3);
    assert!(results[1].outputs.is_empty());
    assert_eq!(results[1].clone().into_value().to_string(), "((u8:2,), ())");
}

#[test]
fn empty_rows_can_be_dropped() {
    let mut harness = BatchHarness::new(
        MockToolchain::default(),
        RunConfig::default().with_empty_rows(EmptyRowPolicy::Drop),
    );
    let results = ok_rows(harness.run_proc("", "P", &rows(&[4, 0, 6]), &[u8v(0)]).unwrap());
    let outputs: Vec<_> = results.iter().map(|row| row.outputs.clone()).collect();
    assert_eq!(outputs, [vec![u8v(4)], vec![u8v(6)]]);
    assert_eq!(results[1].next_state, [u8v(3)]);
}

mod dslx {
    use super::*;
    use std::path::Path;

    fn harness() -> BatchHarness<DslxToolchain> {
        let stdlib = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("lib");
        BatchHarness::dslx(RunConfig::default().with_stdlib_path(stdlib))
    }

    #[test]
    fn adds_a_batch() {
        let results = harness()
            .run_function(
                "fn add(x: u8, y: u8) -> u8 { x + y }",
                "add",
                &[vec![u8v(1), u8v(2)], vec![u8v(10), u8v(20)]],
            )
            .unwrap();
        assert_eq!(ok_rows(results), [u8v(3), u8v(30)]);
    }

    #[test]
    fn arguments_take_the_declared_signedness() {
        let results = harness()
            .run_function(
                "fn halve(x: s8) -> s8 { x >> 1 }",
                "halve",
                &[vec![u8v(0xfc)]],
            )
            .unwrap();
        assert_eq!(ok_rows(results), [Value::sbits(8, -2)]);
    }

    #[test]
    fn compile_errors_surface_before_lookup() {
        let error = harness()
            .run_function("fn add(x: u8) -> u8 { x + }", "add", &[])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Compile);
    }

    #[test]
    fn deeply_nested_source_fails_as_a_compile_error() {
        let nested = format!("{}u8:1{}", "(".repeat(5000), ")".repeat(5000));
        let source = format!("fn f() -> u8 {{ {nested} }}");
        let error = harness().run_function(&source, "f", &[vec![]]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Compile);
    }

    #[test]
    fn proc_accumulates_across_ticks() {
        let source = "proc Acc {
            config(input: chan<u8> in, output: chan<u8> out) { }
            next(sum: u8) {
                let total = sum + recv(input);
                send(output, total);
                total
            }
        }";
        let results = harness()
            .run_proc(source, "Acc", &rows(&[1, 2, 3]), &[u8v(10)])
            .unwrap();
        let rendered: Vec<_> = ok_rows(results)
            .into_iter()
            .map(|row| row.into_value().to_string())
            .collect();
        assert_eq!(
            rendered,
            [
                "((u8:11,), (u8:11,))",
                "((u8:13,), (u8:13,))",
                "((u8:16,), (u8:16,))"
            ]
        );
    }

    #[test]
    fn non_channel_member_fails_before_any_tick() {
        let source = "proc P {
            config(limit: u8) { }
            next() { () }
        }";
        let error = harness().run_proc(source, "P", &[vec![]], &[]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
    }

    #[test]
    fn second_recv_in_one_tick_is_a_runtime_error() {
        let source = "proc Greedy {
            config(input: chan<u8> in, output: chan<u8> out) { }
            next() {
                let a = recv(input);
                let b = recv(input);
                send(output, a + b);
                ()
            }
        }";
        let error = harness()
            .run_proc(source, "Greedy", &rows(&[1]), &[])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Runtime);
        assert!(error.to_string().starts_with("row 0: "), "{error}");
    }

    #[test]
    fn rows_after_a_failed_tick_read_their_own_inputs() {
        let source = "proc Two {
            config(a: chan<u8> in, b: chan<u8> in, output: chan<u8> out) { }
            next() {
                let x = recv(a);
                let q = u8:10 / x;
                let y = recv(b);
                send(output, y);
                ()
            }
        }";
        let batch = vec![
            vec![u8v(0), u8v(100)],
            vec![u8v(1), u8v(101)],
            vec![u8v(1), u8v(102)],
        ];
        let mut harness = BatchHarness::dslx(
            RunConfig::default().with_row_failures(RowFailurePolicy::TagRows),
        );
        let results = harness.run_proc(source, "Two", &batch, &[]).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap_err().kind(), ErrorKind::Runtime);
        assert_eq!(results[1].as_ref().unwrap().outputs, [u8v(101)]);
        assert_eq!(results[2].as_ref().unwrap().outputs, [u8v(102)]);
    }
}
