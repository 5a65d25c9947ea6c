use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};
use lattice_reactivity::{computed, effect, make_ref, reactive, EffectRunner, Observable, Value};
use serde_json::json;

fn counter_effects(state: &Value, count: usize) -> (Rc<Cell<u64>>, Vec<EffectRunner>) {
    let runs = Rc::new(Cell::new(0));
    let runners = (0..count)
        .map(|_| {
            let (state, runs) = (state.clone(), runs.clone());
            effect(move || {
                black_box(state.get("count"));
                runs.set(runs.get() + 1);
            })
        })
        .collect();
    (runs, runners)
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("trigger_single_effect", |b| {
        let state = reactive(json!({"count": 0}));
        let (_runs, _runners) = counter_effects(&state, 1);
        let mut i = 0;
        b.iter(|| {
            i += 1;
            state.set("count", i);
        });
    });

    c.bench_function("trigger_fan_out_100", |b| {
        let state = reactive(json!({"count": 0}));
        let (_runs, _runners) = counter_effects(&state, 100);
        let mut i = 0;
        b.iter(|| {
            i += 1;
            state.set("count", i);
        });
    });

    c.bench_function("computed_chain_10", |b| {
        let source = make_ref(0);
        let mut tail = {
            let source = source.clone();
            computed(move || source.get())
        };
        for _ in 0..10 {
            let prev = tail.clone();
            tail = computed(move || prev.value());
        }
        let mut i = 0;
        b.iter(|| {
            i += 1;
            source.set(i);
            black_box(tail.value())
        });
    });

    c.bench_function("sequence_push_100", |b| {
        b.iter(|| {
            let list = reactive(json!([]));
            let list: &Observable = list.as_observable().expect("sequence handle");
            for i in 0..100 {
                list.push([i]).expect("push onto a sequence");
            }
            black_box(list.raw_target().len())
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
