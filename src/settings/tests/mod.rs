use super::*;

fn fl() -> FlSettings {
    FlSettings {
        num_rounds: 3,
        fraction_fit: 0.5,
        fraction_evaluate: 0.5,
        min_fit_clients: 1,
        min_evaluate_clients: 1,
        fit_timeout: 10,
        evaluate_timeout: 10,
        strategy: StrategyKind::FedAvg,
        proximal_mu: 0.,
        selection_seed: 0,
    }
}

fn client() -> ClientSettings {
    ClientSettings {
        local_epochs: 1,
        learning_rate: 0.1,
        batch_size: 8,
        val_fraction: 0.1,
        seed: 0,
    }
}

#[test]
fn test_settings_new() {
    let settings = Settings::new("configs/config.toml").unwrap();
    assert_eq!(settings.fl.strategy, StrategyKind::FedProx);
    assert_eq!(settings.client.learning_rate, 0.1);
    assert_eq!(settings.partition.shard_size, Some(100));
    assert!(Settings::new("").is_err());
}

#[test]
fn test_validate_fl() {
    assert!(fl().validate().is_ok());

    // fractions
    assert!(FlSettings {
        fraction_fit: 0.,
        ..fl()
    }
    .validate()
    .is_err());
    assert!(FlSettings {
        fraction_fit: 1. + f64::EPSILON,
        ..fl()
    }
    .validate()
    .is_err());
    assert!(FlSettings {
        fraction_evaluate: 0.,
        ..fl()
    }
    .validate()
    .is_ok());
    assert!(FlSettings {
        fraction_evaluate: -0.1,
        ..fl()
    }
    .validate()
    .is_err());

    // counts
    assert!(FlSettings {
        num_rounds: 0,
        ..fl()
    }
    .validate()
    .is_err());
    assert!(FlSettings {
        min_fit_clients: 0,
        ..fl()
    }
    .validate()
    .is_err());

    assert!(FlSettings {
        proximal_mu: -1.,
        ..fl()
    }
    .validate()
    .is_err());
}

#[test]
fn test_validate_client() {
    assert!(client().validate().is_ok());
    // fractional learning rates are kept as they are
    assert!(ClientSettings {
        learning_rate: 0.001,
        ..client()
    }
    .validate()
    .is_ok());
    assert!(ClientSettings {
        learning_rate: 0.,
        ..client()
    }
    .validate()
    .is_err());
    assert!(ClientSettings {
        val_fraction: 1.,
        ..client()
    }
    .validate()
    .is_err());
    assert!(ClientSettings {
        batch_size: 0,
        ..client()
    }
    .validate()
    .is_err());
}

#[test]
fn test_validate_partition() {
    let partition = PartitionSettings {
        num_partitions: 4,
        num_shards_per_partition: 2,
        shard_size: None,
        seed: 0,
    };
    assert!(partition.validate().is_ok());
    assert!(PartitionSettings {
        shard_size: Some(0),
        ..partition
    }
    .validate()
    .is_err());
    assert!(PartitionSettings {
        num_partitions: 0,
        ..partition
    }
    .validate()
    .is_err());
}

#[test]
fn test_strategy_kind() {
    #[derive(Deserialize)]
    struct Wrapper {
        strategy: StrategyKind,
    }

    let config = Config::builder()
        .add_source(File::from_str(
            "strategy = \"fedavg\"",
            config::FileFormat::Toml,
        ))
        .build()
        .unwrap();
    let wrapper: Wrapper = config.try_deserialize().unwrap();
    assert_eq!(wrapper.strategy, StrategyKind::FedAvg);
}

#[test]
fn test_timeouts() {
    assert_eq!(fl().fit_timeout(), Duration::from_secs(10));
    assert_eq!(fl().evaluate_timeout(), Duration::from_secs(10));
}
