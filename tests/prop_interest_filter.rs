use std::sync::Arc;

use proptest::prelude::*;
use dapp_core::testing::{full_dependencies, RecordingScript};
use dapp_core::{Command, CommandKind, Dispatcher, InterestSet};

fn any_kind() -> impl Strategy<Value = CommandKind> {
    (0..CommandKind::ALL.len()).prop_map(|i| CommandKind::ALL[i])
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A script receives exactly the subsequence of the stream whose kind is in
    /// its interest set, in stream order.
    #[test]
    fn prop_received_is_filtered_subsequence(
        interest in proptest::collection::vec(any_kind(), 0..6),
        stream in proptest::collection::vec((any_kind(), any::<u64>()), 0..40),
    ) {
        let interest: InterestSet = interest.into_iter().collect();
        let script = Arc::new(RecordingScript::new(interest));

        let received = runtime().block_on(async {
            let dispatcher = Dispatcher::default();
            let id = dispatcher
                .register_and_activate("subject", script.clone(), full_dependencies())
                .expect("activate");
            for (i, (kind, t)) in stream.iter().enumerate() {
                dispatcher.dispatch(Command::new(*kind, (i as u32).to_le_bytes().to_vec(), *t)).await;
            }
            dispatcher.retire(id).await.expect("retire");
            script.received()
        });

        let expected: Vec<Command> = stream
            .iter()
            .enumerate()
            .filter(|(_, (kind, _))| interest.contains(*kind))
            .map(|(i, (kind, t))| Command::new(*kind, (i as u32).to_le_bytes().to_vec(), *t))
            .collect();
        prop_assert_eq!(received, expected);
    }

    /// Two scripts with different interests see independent, correctly
    /// filtered views of the same stream.
    #[test]
    fn prop_scripts_filter_independently(
        stream in proptest::collection::vec(any_kind(), 0..30),
    ) {
        let assets = Arc::new(RecordingScript::new([CommandKind::CreateAsset, CommandKind::TransferAsset]));
        let roles = Arc::new(RecordingScript::new([CommandKind::CreateRole, CommandKind::AppendRole]));

        runtime().block_on(async {
            let dispatcher = Dispatcher::default();
            dispatcher.register_and_activate("assets", assets.clone(), full_dependencies()).expect("activate");
            dispatcher.register_and_activate("roles", roles.clone(), full_dependencies()).expect("activate");
            for (t, kind) in stream.iter().enumerate() {
                dispatcher.dispatch(Command::new(*kind, Vec::new(), t as u64)).await;
            }
            dispatcher.shutdown().await;
        });

        prop_assert_eq!(times(&assets), expected(&stream, &[CommandKind::CreateAsset, CommandKind::TransferAsset]));
        prop_assert_eq!(times(&roles), expected(&stream, &[CommandKind::CreateRole, CommandKind::AppendRole]));
    }
}

fn times(script: &RecordingScript) -> Vec<u64> {
    script.received().iter().map(|c| c.created_time).collect()
}

fn expected(stream: &[CommandKind], wanted: &[CommandKind]) -> Vec<u64> {
    stream
        .iter()
        .enumerate()
        .filter(|(_, k)| wanted.contains(k))
        .map(|(t, _)| t as u64)
        .collect()
}
