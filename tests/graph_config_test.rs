// 配置驱动的指标图集成测试 @yutiansut @quantaxis
//
// TOML 文件 → EngineConfig → IndicatorGraph，再用 GBM tick 流驱动
//
// 运行：cargo test --test graph_config_test -- --nocapture

use std::io::Write;

use qaindicator::{
    Band, EngineConfig, Ema, GbmFeed, Indicator, IndicatorError, IndicatorGraph, Sample, Sma,
    StdDev, UpdateKind,
};

const GRAPH: &str = r#"
sources = ["close", "hl2"]

[engine]
emit_nan = false

[[indicators]]
id = "fast"
kind = "ema"
period = 5
inputs = ["close"]

[[indicators]]
id = "slow"
kind = "ema"
period = 20
inputs = ["close"]

[[indicators]]
id = "macd"
kind = "binary"
op = "sub"
inputs = ["fast", "slow"]

[[indicators]]
id = "mid"
kind = "sma"
period = 20
inputs = ["close"]

[[indicators]]
id = "dev"
kind = "std_dev"
period = 20
inputs = ["close"]

[[indicators]]
id = "upper"
kind = "band"
multiplier = 2.0
inputs = ["mid", "dev"]

[[indicators]]
id = "lower"
kind = "band"
multiplier = -2.0
inputs = ["mid", "dev"]

[[indicators]]
id = "adaptive"
kind = "dsma"
period = 10
inputs = ["hl2"]
emit_nan = true
"#;

fn load_graph() -> IndicatorGraph {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(GRAPH.as_bytes()).unwrap();
    let config = EngineConfig::load_from_file(file.path()).unwrap();
    IndicatorGraph::from_config(&config).unwrap()
}

#[test]
fn test_load_graph_from_file() {
    let graph = load_graph();
    assert_eq!(graph.len(), 10);
    assert_eq!(graph.sources(), vec!["close", "hl2"]);
    assert_eq!(graph.warmup_period("macd"), Some(20));
    assert_eq!(graph.warmup_period("upper"), Some(20));
    assert_eq!(graph.warmup_period("adaptive"), Some(20));
    assert_eq!(graph.dependents("mid"), vec!["upper", "lower"]);
}

#[test]
fn test_drive_graph_with_ticks() {
    let graph = load_graph();
    let mut feed = GbmFeed::with_seed(99).unwrap();

    let mut bars = 0;
    for (bar, kind) in feed.ticks(4).take(4 * 60) {
        graph.push_bar(&bar, kind).unwrap();
        if kind == UpdateKind::Append {
            bars += 1;
        }

        // 每个节点每根 K 线恰好一个输出
        for id in graph.ids() {
            assert_eq!(graph.series(id).unwrap().len(), bars, "{}", id);
        }

        let mid = graph.last_value("mid").unwrap();
        let upper = graph.last_value("upper").unwrap();
        let lower = graph.last_value("lower").unwrap();
        assert!(lower <= mid && mid <= upper);

        let macd = graph.last_value("macd").unwrap();
        let expected = graph.last_value("fast").unwrap() - graph.last_value("slow").unwrap();
        assert_eq!(macd, expected);
    }

    assert_eq!(bars, 60);
    assert!(graph.all_hot());
    let adaptive = graph.series("adaptive").unwrap().values();
    assert!(adaptive[..19].iter().all(|v| v.is_nan()));
    assert!(adaptive[19..].iter().all(|v| v.is_finite()));
}

#[test]
fn test_live_graph_matches_closed_bar_graph() {
    let live = load_graph();
    let closed = load_graph();

    let mut feed = GbmFeed::with_seed(5).unwrap();
    let ticks: Vec<_> = feed.ticks(5).take(5 * 50).collect();
    for (i, (bar, kind)) in ticks.iter().enumerate() {
        live.push_bar(bar, *kind).unwrap();
        let bar_closes = ticks
            .get(i + 1)
            .map(|(_, k)| *k == UpdateKind::Append)
            .unwrap_or(true);
        if bar_closes {
            closed.push_bar(bar, UpdateKind::Append).unwrap();
        }
    }

    for id in live.ids() {
        let a = live.series(id).unwrap().values();
        let b = closed.series(id).unwrap().values();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9 || (x.is_nan() && y.is_nan()), "{}", id);
        }
    }
}

#[test]
fn test_graph_rejects_backwards_timestamp() {
    let graph = load_graph();
    graph.append("close", Sample::new(100, 1.0)).unwrap();
    let err = graph.append("close", Sample::new(50, 1.0)).unwrap_err();
    assert_eq!(
        err,
        IndicatorError::OrderViolation {
            series: "close".to_string(),
            last: 100,
            found: 50
        }
    );
    assert_eq!(graph.series("fast").unwrap().len(), 1);
}

#[test]
fn test_manual_graph_with_late_attached_band() {
    let mut graph = IndicatorGraph::new();
    graph.add_source("close").unwrap();
    graph
        .add_indicator("mid", "close", Box::new(Sma::new(3).unwrap()))
        .unwrap();
    graph
        .add_indicator("dev", "close", Box::new(StdDev::new(3).unwrap()))
        .unwrap();
    for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
        graph.append("close", Sample::new(i as i64, *v)).unwrap();
    }

    // 挂载时回放已有历史
    let upper = graph
        .add_composite(
            "upper",
            &["mid", "dev"],
            Box::new(Band::new(1.0).unwrap().with_warmup(3)),
        )
        .unwrap();
    assert_eq!(upper.len(), 4);
    assert_eq!(graph.is_hot("upper"), Some(true));

    graph.append("close", Sample::new(4, 5.0)).unwrap();
    let expected = 4.0 + (2.0f64 / 3.0).sqrt();
    assert!((upper.last_value().unwrap() - expected).abs() < 1e-9);
}

#[test]
fn test_bad_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"sources = [\"close\"]\n[[indicators]]\nid = \"x\"\nkind = \"sma\"\nperiod = 0\ninputs = [\"close\"]\n")
        .unwrap();
    let config = EngineConfig::load_from_file(file.path()).unwrap();
    assert!(matches!(
        IndicatorGraph::from_config(&config),
        Err(IndicatorError::InvalidConfiguration(_))
    ));
}

// ============================================================================
// 预热 NaN 沿链路传递
// ============================================================================
const GATED: &str = r#"
sources = ["close"]

[engine]
emit_nan = true

[[indicators]]
id = "fast"
kind = "ema"
period = 5
inputs = ["close"]

[[indicators]]
id = "slow"
kind = "ema"
period = 20
inputs = ["close"]

[[indicators]]
id = "macd"
kind = "binary"
op = "sub"
inputs = ["fast", "slow"]

[[indicators]]
id = "signal"
kind = "ema"
period = 9
inputs = ["macd"]

[[indicators]]
id = "hist"
kind = "binary"
op = "sub"
inputs = ["macd", "signal"]
"#;

#[test]
fn test_engine_wide_nan_gating_through_chain() {
    let config = EngineConfig::from_toml_str(GATED).unwrap();
    let graph = IndicatorGraph::from_config(&config).unwrap();
    let mut feed = GbmFeed::with_seed(17).unwrap();
    for (bar, kind) in feed.ticks(4).take(4 * 80) {
        graph.push_bar(&bar, kind).unwrap();
    }

    let macd = graph.series("macd").unwrap().values();
    let signal = graph.series("signal").unwrap().values();
    let hist = graph.series("hist").unwrap().values();
    assert_eq!(signal.len(), 80);

    // macd 在 slow 就绪后才有值；signal 从 macd 的第一个有效值开始预热
    assert!(macd[..19].iter().all(|v| v.is_nan()));
    assert!(macd[19..].iter().all(|v| v.is_finite()));
    assert!(signal[..27].iter().all(|v| v.is_nan()));
    assert!(signal[27..].iter().all(|v| v.is_finite()));
    assert!(hist[..27].iter().all(|v| v.is_nan()));
    assert!(hist[27..].iter().all(|v| v.is_finite()));
    assert!(graph.all_hot());

    // 与直接把 macd 的有效收盘值喂给 EMA(9) 一致
    let mut reference = Ema::new(9).unwrap().with_nan(true);
    for (i, &v) in macd[19..].iter().enumerate() {
        let expected = reference.push(Sample::new(i as i64, v)).unwrap().value;
        let got = signal[19 + i];
        assert!(
            (got - expected).abs() < 1e-9 || (got.is_nan() && expected.is_nan()),
            "bar {}: {} vs {}",
            19 + i,
            got,
            expected
        );
    }
}

// ============================================================================
// 失败的调用不改变任何状态
// ============================================================================
const SPREAD: &str = r#"
sources = ["close", "bench"]

[[indicators]]
id = "ema"
kind = "ema"
period = 3
inputs = ["close"]

[[indicators]]
id = "spread"
kind = "binary"
op = "sub"
inputs = ["ema", "bench"]

[[indicators]]
id = "smooth"
kind = "sma"
period = 2
inputs = ["spread"]
"#;

fn lengths(graph: &IndicatorGraph) -> Vec<usize> {
    graph
        .ids()
        .iter()
        .map(|id| graph.series(id).unwrap().len())
        .collect()
}

#[test]
fn test_desynchronized_call_leaves_graph_unchanged() {
    let config = EngineConfig::from_toml_str(SPREAD).unwrap();
    let graph = IndicatorGraph::from_config(&config).unwrap();
    for t in 0..5 {
        graph.append("close", Sample::new(t, 100.0 + t as f64)).unwrap();
        graph.append("bench", Sample::new(t, 50.0)).unwrap();
    }
    graph.append("bench", Sample::new(5, 51.0)).unwrap();

    let before = graph.snapshot();
    let lens = lengths(&graph);
    let hot: Vec<Option<bool>> = graph.ids().iter().map(|id| graph.is_hot(id)).collect();

    for result in [
        graph.append("close", Sample::new(6, 1.0)),
        graph.amend("close", Sample::new(4, 1.0)),
        graph.append("bench", Sample::new(6, 1.0)),
    ] {
        assert!(matches!(
            result,
            Err(IndicatorError::DesynchronizedInputs { .. })
        ));
        assert_eq!(graph.snapshot(), before);
        assert_eq!(lengths(&graph), lens);
        assert_eq!(
            graph.ids().iter().map(|id| graph.is_hot(id)).collect::<Vec<_>>(),
            hot
        );
    }

    // 补上缺失的输入后继续工作
    graph.append("close", Sample::new(5, 105.0)).unwrap();
    assert_eq!(graph.series("spread").unwrap().len(), 6);
    assert_eq!(graph.last_value("spread"), Some(104.0 - 51.0));
    assert_eq!(graph.series("smooth").unwrap().len(), 6);
}
