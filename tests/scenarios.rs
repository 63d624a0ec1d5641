use chrono::{TimeZone, Utc};
use smartdca::config::{AddStakeMode, PolicyConfig, TriggerMode};
use smartdca::models::{Candle, MarketSnapshot, Position, Side, StakeLimits};
use smartdca::policy::{
    AveragingDecision, AveragingPolicy, ExitReason, HoldReason, RiskSizer, SizingDecision,
    StopPolicy, StopSource,
};
use smartdca::strategy::{SmartScalping, Strategy};
use smartdca::PolicyError;

fn limits() -> StakeLimits {
    StakeLimits::new(10.0, 1000.0)
}

fn opened() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn tick(price: f64, atr: f64) -> MarketSnapshot {
    MarketSnapshot {
        atr: Some(atr),
        ..MarketSnapshot::at_price("ETH/USDT", price)
    }
}

#[test]
fn test_geometric_stake_ladder() {
    let sizer = RiskSizer::new(0.02, 1.6);
    let stakes: Vec<f64> = (0..3)
        .map(|i| sizer.size(1000.0, 1.0, limits(), i).unwrap().stake().unwrap())
        .collect();

    assert!((stakes[0] - 20.0).abs() < 1e-9);
    assert!((stakes[1] - 32.0).abs() < 1e-9);
    assert!((stakes[2] - 51.2).abs() < 1e-9);
}

#[test]
fn test_atr_excursion_adds() {
    let policy = AveragingPolicy::new(PolicyConfig::default()).unwrap();
    let position = Position::open("ETH/USDT", Side::Long, 100.0, 20.0, 1.0, opened());

    let decision = policy.should_add(&position, &tick(96.0, 2.0), 1000.0, limits()).unwrap();
    assert!(decision.is_add());
}

#[test]
fn test_profit_ratchet_beats_static_stop() {
    let stop = StopPolicy::from_config(&PolicyConfig::default().stop);
    let level = stop.stop_level(1, 0.025, -0.05);

    assert_eq!(level.fraction, -0.01);
    assert_eq!(level.source, StopSource::ProfitRatchet);
}

/// Open, average twice, hit the limit, then ride a bounce with the ratchet
#[test]
fn test_position_lifecycle() {
    let policy = AveragingPolicy::new(PolicyConfig::default()).unwrap();
    let max_entries = policy.trigger().max_entries();

    let initial = policy.initial_stake(1000.0, 1.0, limits(), opened()).unwrap();
    let stake = initial.stake().unwrap();
    let mut position = Position::open("ETH/USDT", Side::Long, 100.0, stake, 1.0, opened());

    // First dip: 4 >= 2 * 1.5 * 1
    let decision = policy.evaluate(&position, &tick(96.0, 2.0), 1000.0, limits());
    let AveragingDecision::Add { stake, entry_index } = decision.averaging else {
        panic!("expected add, got {:?}", decision.averaging);
    };
    assert_eq!(entry_index, 1);
    assert!((stake - 32.0).abs() < 1e-9);

    // Order in flight: the next tick must not add again
    position.entry_order_pending = true;
    let decision = policy.evaluate(&position, &tick(95.0, 2.0), 1000.0, limits());
    assert_eq!(
        decision.averaging,
        AveragingDecision::NoAction {
            reason: HoldReason::OrderPending
        }
    );

    position.record_fill(96.0, stake, max_entries).unwrap();
    assert_eq!(position.entry_count, 2);
    assert!(!position.entry_order_pending);
    assert!(position.entry_price < 100.0 && position.entry_price > 96.0);

    // Same price again: the raised threshold holds it off
    let decision = policy.evaluate(&position, &tick(96.0, 2.0), 1000.0, limits());
    assert!(!decision.averaging.is_add());
    assert_eq!(decision.stop.fraction, -0.07);

    // Deeper dip: third entry
    let price = position.entry_price - 6.5;
    let decision = policy.evaluate(&position, &tick(price, 2.0), 1000.0, limits());
    let AveragingDecision::Add { stake, entry_index } = decision.averaging else {
        panic!("expected add, got {:?}", decision.averaging);
    };
    assert_eq!(entry_index, 2);
    assert!((stake - 51.2).abs() < 1e-9);
    position.record_fill(price, stake, max_entries).unwrap();

    // Each averaging entry runs at lower leverage
    assert_eq!(policy.leverage(position.entry_count, 5.0).unwrap(), 1.0);

    // At the limit: no more adds however far it falls, and fills are rejected
    let decision = policy.evaluate(&position, &tick(1.0, 2.0), 1000.0, limits());
    assert_eq!(
        decision.averaging,
        AveragingDecision::NoAction {
            reason: HoldReason::MaxEntriesReached
        }
    );
    assert_eq!(decision.stop.fraction, -0.05);
    assert_eq!(
        position.record_fill(50.0, 10.0, max_entries),
        Err(PolicyError::EntryLimit { max: 3 })
    );

    // Bounce past +2%, then pull back: the latched ratchet holds
    let peak = position.entry_price * 1.03;
    position.record_profit(position.profit_ratio(peak));
    assert_eq!(policy.stop(&position, &tick(peak, 2.0)).fraction, -0.01);

    let pullback = position.entry_price * 1.005;
    let level = policy.stop(&position, &tick(pullback, 2.0));
    assert_eq!(level.fraction, -0.01);
    assert_eq!(level.source, StopSource::ProfitRatchet);

    // Past the 3% target the tick asks for an exit
    let decision = policy.evaluate(&position, &tick(peak * 1.01, 2.0), 1000.0, limits());
    assert_eq!(decision.exit, Some(ExitReason::TakeProfit));
}

#[test]
fn test_v5_profile_from_toml() {
    let config = PolicyConfig::from_toml_str(
        r#"
        version = 1

        [averaging]
        max_entries = 2
        add_stake = "min_stake"

        [averaging.trigger]
        mode = "profit_drawdown"
        threshold = -0.05

        [sizing.trading_hours]
        start = "08:00:00"
        end = "20:00:00"
        "#,
    )
    .unwrap();
    assert_eq!(config.averaging.add_stake, AddStakeMode::MinStake);
    assert_eq!(config.averaging.trigger, TriggerMode::ProfitDrawdown { threshold: -0.05 });

    let policy = AveragingPolicy::new(config).unwrap();
    let night = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
    assert!(matches!(
        policy.initial_stake(1000.0, 1.0, limits(), night).unwrap(),
        SizingDecision::Decline { .. }
    ));

    let position = Position::open("ETH/USDT", Side::Long, 100.0, 20.0, 1.0, opened());
    let decision = policy
        .should_add(&position, &MarketSnapshot::at_price("ETH/USDT", 94.0), 1000.0, limits())
        .unwrap();
    assert_eq!(
        decision,
        AveragingDecision::Add {
            stake: 10.0,
            entry_index: 1
        }
    );
}

#[test]
fn test_snapshot_from_candles_feeds_strategy() {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let candles: Vec<Candle> = (0..80)
        .map(|i| {
            let close = 100.0 + i as f64 * 0.5;
            Candle {
                timestamp: base + chrono::Duration::minutes(5 * i),
                open: close - 0.2,
                high: close + 0.6,
                low: close - 0.8,
                close,
                volume: 1_000.0,
            }
        })
        .collect();

    let config = PolicyConfig::default();
    let snapshot = MarketSnapshot::from_candles("ETH/USDT", &candles, &config.indicators).unwrap();
    assert!(snapshot.atr.is_some());
    assert!(snapshot.ema_fast.unwrap() > snapshot.ema_slow.unwrap());

    let strategy = SmartScalping::new(config.signals.clone(), config.indicators.clone());
    let signals = strategy.evaluate(&snapshot).unwrap();
    // A straight climb pins RSI at 100: overbought, so exit rather than enter
    assert_eq!(snapshot.rsi, Some(100.0));
    assert!(!signals.enter_long);
    assert!(signals.exit_long);
    assert!(!signals.enter_short);
}
