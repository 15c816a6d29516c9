//! Partitioned writes through the fan-out driver, one session per partition.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use futures_util::FutureExt;
use msarrow::driver::recording::{Call, RecordingDriver};
use msarrow::{fan_out, FanOutOptions, InsertOptions, TargetTable};

fn partition(start: i64, len: i64) -> RecordBatch {
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(start..start + len));
    RecordBatch::try_from_iter(vec![("id", ids)]).unwrap()
}

#[tokio::test]
async fn each_partition_commits_on_its_own_session() {
    let log = RecordingDriver::new();
    let table = Arc::new(
        TargetTable::new("db", "dbo", "events")
            .with_schema(Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]))),
    );
    let opts = Arc::new(InsertOptions::default());
    let partitions: Vec<RecordBatch> = (0..4).map(|p| partition(p * 25, 25)).collect();

    let fan = fan_out(
        Arc::new(log.clone()),
        move |session, batch: RecordBatch| {
            let (table, opts) = (Arc::clone(&table), Arc::clone(&opts));
            async move { session.insert_arrow(&table, batch, &opts).await }.boxed()
        },
        partitions,
        &FanOutOptions {
            concurrency: 2,
            ..FanOutOptions::default()
        },
    )
    .unwrap();

    let written: u64 = fan.collect().await.into_iter().map(Result::unwrap).sum();
    assert_eq!(written, 100);
    assert_eq!(log.connections(), 4);

    let calls = log.calls();
    assert_eq!(calls.iter().filter(|c| **c == Call::Commit).count(), 4);
    assert_eq!(calls.iter().filter(|c| **c == Call::Close).count(), 4);
}
