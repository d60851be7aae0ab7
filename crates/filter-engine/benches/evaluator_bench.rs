//! 规则求值性能基准测试
//!
//! 覆盖单设备求值、整网顺序/并行执行以及带过滤器引用的批量执行。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use filter_engine::network::{Generator, Injection, NetworkData, Substation, VoltageLevel};
use filter_engine::{
    DataType, EquipmentType, EvaluationContext, ExpertFilter, ExpertRule, FieldType,
    FilterExecutor, FilterStore, Network, OperatorType, RuleCompiler, RuleDefinition, TreeCodec,
};
use std::collections::BTreeMap;
use std::hint::black_box;

const COUNTRIES: [&str; 4] = ["FR", "BE", "DE", "ES"];

/// 构造包含 `size` 台发电机的网络
fn create_network(size: usize) -> Network {
    let substations = COUNTRIES
        .iter()
        .map(|country| Substation {
            id: format!("S_{}", country),
            name: None,
            country: Some(country.to_string()),
            properties: BTreeMap::new(),
        })
        .collect();
    let voltage_levels = COUNTRIES
        .iter()
        .map(|country| VoltageLevel {
            id: format!("VL_{}", country),
            name: None,
            substation_id: Some(format!("S_{}", country)),
            nominal_v: 400.0,
        })
        .collect();
    let generators = (0..size)
        .map(|i| Generator {
            injection: Injection {
                id: format!("G{}", i),
                name: Some(format!("Generator {}", i)),
                voltage_level_id: format!("VL_{}", COUNTRIES[i % COUNTRIES.len()]),
                connected: i % 7 != 0,
                properties: BTreeMap::new(),
            },
            max_p: (i % 1000) as f64,
            target_p: (i % 500) as f64,
            ..Default::default()
        })
        .collect();

    Network::new(NetworkData {
        substations,
        voltage_levels,
        generators,
        ..Default::default()
    })
}

fn compile(definition: RuleDefinition) -> ExpertRule {
    RuleCompiler::new().compile(&definition).unwrap()
}

fn create_rule() -> ExpertRule {
    compile(RuleDefinition::and(vec![
        RuleDefinition::leaf(DataType::String, FieldType::Country, OperatorType::In, "FR,BE"),
        RuleDefinition::leaf(
            DataType::Number,
            FieldType::TargetP,
            OperatorType::GreaterOrEquals,
            100,
        ),
        RuleDefinition::or(vec![
            RuleDefinition::leaf(
                DataType::Boolean,
                FieldType::Connected,
                OperatorType::Equals,
                true,
            ),
            RuleDefinition::leaf(DataType::String, FieldType::Name, OperatorType::EndsWith, "7"),
        ]),
    ]))
}

/// 单设备求值基准
fn bench_single_evaluation(c: &mut Criterion) {
    let network = create_network(10);
    let store = FilterStore::new();
    let rule = create_rule();
    let ctx = EvaluationContext::new(&network, &store);
    let equipment = network.equipments(EquipmentType::Generator)[4];

    c.bench_function("evaluate_single_generator", |b| {
        b.iter(|| rule.evaluate(black_box(equipment), &ctx))
    });
}

/// 整网执行：顺序 vs 并行
fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    let store = FilterStore::new();
    let filter = ExpertFilter::new(EquipmentType::Generator, create_rule());

    for size in [1_000usize, 10_000, 100_000] {
        let network = create_network(size);

        group.bench_with_input(BenchmarkId::new("sequential", size), &network, |b, network| {
            let executor = FilterExecutor::new();
            b.iter(|| executor.execute(black_box(&filter), network, &store))
        });

        group.bench_with_input(BenchmarkId::new("parallel", size), &network, |b, network| {
            let executor = FilterExecutor::new().with_parallel(true);
            b.iter(|| executor.execute(black_box(&filter), network, &store))
        });
    }

    group.finish();
}

/// 带过滤器引用的批量执行，被引用过滤器在会话内只求值一次
fn bench_execute_with_references(c: &mut Criterion) {
    let network = create_network(10_000);
    let store = FilterStore::new();

    let base = ExpertFilter::new(EquipmentType::Generator, create_rule());
    let base_id = base.id();
    let mut ids = Vec::new();
    let mut filters = vec![base];
    for _ in 0..10 {
        let filter = ExpertFilter::new(
            EquipmentType::Generator,
            compile(RuleDefinition::filter_reference(OperatorType::IsNotPartOf, &[base_id])),
        );
        ids.push(filter.id());
        filters.push(filter);
    }
    store.load_batch(filters).unwrap();

    c.bench_function("execute_all_shared_reference", |b| {
        let executor = FilterExecutor::new().with_parallel(true);
        b.iter(|| executor.execute_all(black_box(&ids), &store, &network))
    });
}

/// 规则树编解码基准
fn bench_codec(c: &mut Criterion) {
    let children = (0..50)
        .map(|i| {
            RuleDefinition::and(vec![
                RuleDefinition::leaf(
                    DataType::String,
                    FieldType::Id,
                    OperatorType::Is,
                    format!("G{}", i),
                ),
                RuleDefinition::leaf(DataType::Number, FieldType::MaxP, OperatorType::Lower, i),
            ])
        })
        .collect();
    let rule = compile(RuleDefinition::or(children));
    let encoded = TreeCodec::encode(&rule);

    c.bench_function("codec_encode", |b| b.iter(|| TreeCodec::encode(black_box(&rule))));
    c.bench_function("codec_decode", |b| {
        b.iter(|| TreeCodec::decode(black_box(&encoded.rules), &encoded.property_values))
    });
}

criterion_group!(
    benches,
    bench_single_evaluation,
    bench_execute,
    bench_execute_with_references,
    bench_codec,
);
criterion_main!(benches);
