//! 共享的 `LoadedDataConverter` 在多线程下并发编解码。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use spark_payload::{
    DataConverterConfig, LoadedDataConverter, ModuleExports, ModuleRegistry, Value,
    load_data_converter,
};

const THREADS: usize = 8;
const ROUNDS: u64 = 200;

fn sample(thread: usize, round: u64) -> Vec<Value> {
    let mut object = BTreeMap::new();
    object.insert("thread".to_owned(), Value::from(thread as u64));
    object.insert("round".to_owned(), Value::from(round));
    vec![
        Value::Object(object),
        Value::from(format!("t{thread}-r{round}")),
        Value::from(vec![thread as u8, round as u8]),
        Value::Undefined,
    ]
}

#[test]
fn shared_converter_is_safe_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<LoadedDataConverter>();

    let loaded: Arc<LoadedDataConverter> =
        load_data_converter(&DataConverterConfig::default(), &ModuleRegistry::new())
            .expect("默认配置");

    thread::scope(|scope| {
        for thread in 0..THREADS {
            let loaded = Arc::clone(&loaded);
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    let values = sample(thread, round);
                    let payloads = loaded.encode(&values).expect("编码");
                    assert_eq!(loaded.decode(payloads).expect("解码"), values);
                }
            });
        }
    });
}

#[test]
fn resolved_modules_are_shared_across_threads() {
    let registry = ModuleRegistry::new()
        .with_module(
            "acme/default",
            ModuleExports::payload_converter(Arc::new(
                spark_payload::DefaultPayloadConverter::new(),
            )),
        )
        .expect("注册");
    let config = DataConverterConfig::new().with_payload_converter_path("acme/default");

    thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| load_data_converter(&config, &registry).map(|_| ())))
            .collect();
        for handle in handles {
            handle.join().expect("线程未恐慌").expect("并发加载");
        }
    });
}
