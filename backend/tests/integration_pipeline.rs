//! End-to-end runs over a small staff roster.

use rowclean::transform::read_json_lines;
use rowclean::{
    partition_rows, read_exception_rows, CleanedRow, ColumnInferencer, ColumnType, CsvRowSource, IngestPipeline,
    JsonLinesSink, MemorySink, Phase, PipelineConfig, ProgressSnapshot, RowSource,
};
use serde_json::json;
use std::path::Path;

const ROSTER: &str = "\
姓名,手机号码,地址,入职日期
张三,13812345678,广东省深圳市南山区科技园路1号,2023-01-15
李四,138-1234-5678,北京市朝阳区建国路88号,2023/02/01
王五,139 1234 5678,上海市浦东新区世纪大道100号,2023年3月1日
赵六,+86 137 1234 5678,浙江省杭州市西湖区文三路90号,20230405
钱七,010-87654321,江苏省南京市鼓楼区中山路1号,2023-05-20
孙八,139-123-45678,四川省成都市武侯区人民南路4号,2023-06-01
周九,13612345678,广东省,2023-07-01
吴十,13512345678,湖北省武汉市洪山区珞喻路1037号,2023-02-30
郑一,13412345678,湖南省长沙市岳麓区麓山南路2号,45000
王二,12345,河南省郑州市金水区花园路10号,2023-10-10
冯三,13312345678,科技园路1号,2023-11-11
陈四,15012345678,福建省厦门市思明区,08/15/2023
褚五,18612345678,山东省青岛市崂山区香港东路,23/08/15
卫六,,陕西省西安市雁塔区,2023-12-01
蒋七,18812345678,云南省昆明市五华区,2024-02-29
";

const EXCEPTION_ROWS: [u64; 7] = [2, 6, 7, 8, 10, 11, 13];
const CLEAN_ROWS: [u64; 8] = [1, 3, 4, 5, 9, 12, 14, 15];

fn write_roster(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("roster.csv");
    std::fs::write(&path, ROSTER).unwrap();
    path
}

fn config(batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_roster_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(dir.path());
    let clean_path = dir.path().join("clean.jsonl");
    let errors_path = dir.path().join("errors.jsonl");

    let mut clean_sink = JsonLinesSink::create(&clean_path).await.unwrap();
    let mut error_sink = JsonLinesSink::create(&errors_path).await.unwrap();
    let mut snapshots: Vec<ProgressSnapshot> = Vec::new();

    let report = IngestPipeline::new(config(4), &mut clean_sink, &mut error_sink)
        .with_task_id("roster")
        .with_progress(&mut snapshots)
        .run_file(&input)
        .await
        .unwrap();

    // Inference
    assert_eq!(report.format.unwrap().encoding_name(), "UTF-8");
    assert_eq!(report.type_map.type_of("姓名"), ColumnType::Text);
    assert_eq!(report.type_map.type_of("手机号码"), ColumnType::Phone);
    assert_eq!(report.type_map.type_of("地址"), ColumnType::Address);
    assert_eq!(report.type_map.type_of("入职日期"), ColumnType::Date);

    // Statistics
    let stats = &report.statistics;
    assert_eq!(stats.total_rows, 15);
    assert_eq!(stats.error_rows, 7);
    assert_eq!(stats.processed_rows, 8);
    assert_eq!(stats.total_rows, stats.processed_rows + stats.error_rows);
    assert_eq!(stats.persisted_clean_rows, 8);
    assert_eq!(stats.persisted_error_rows, 7);
    assert_eq!(stats.flushed_batches, 4);
    assert!(report.flush_failures.is_empty());

    // Outputs
    let exceptions = read_exception_rows(&errors_path).await.unwrap();
    let cleaned: Vec<CleanedRow> = read_json_lines(&clean_path).await.unwrap();
    assert_eq!(exceptions.iter().map(|r| r.row_number).collect::<Vec<_>>(), EXCEPTION_ROWS);
    assert_eq!(cleaned.iter().map(|r| r.row_number).collect::<Vec<_>>(), CLEAN_ROWS);

    let row2 = &exceptions[0];
    assert_eq!(row2.errors.len(), 1);
    assert_eq!(row2.errors[0].field, "手机号码");
    assert_eq!(row2.errors[0].error_type, "PHONE");
    assert_eq!(row2.errors[0].original_value, json!("138-1234-5678"));
    assert_eq!(row2.cleaned_data["手机号码"], json!("138-1234-5678"));
    assert_eq!(row2.cleaned_data["入职日期"], json!("2023-02-01"));

    let error_types = |row: u64| -> Vec<String> {
        exceptions
            .iter()
            .find(|r| r.row_number == row)
            .map(|r| r.errors.iter().map(|e| e.error_type.clone()).collect())
            .unwrap_or_default()
    };
    assert_eq!(error_types(7), vec!["ADDRESS"]);
    assert_eq!(error_types(8), vec!["DATE"]);
    assert_eq!(error_types(13), vec!["DATE"]);
    assert!(exceptions[2].errors[0].error_message.contains("incomplete address"));

    let row1 = &cleaned[0];
    assert_eq!(row1.cleaned_data["手机号码"], json!("13812345678"));
    assert_eq!(row1.cleaned_data["地址"], json!("广东省深圳市南山区科技园路1号"));
    let by_row = |row: u64| cleaned.iter().find(|r| r.row_number == row).unwrap();
    assert_eq!(by_row(3).cleaned_data["入职日期"], json!("2023-03-01"));
    assert_eq!(by_row(4).cleaned_data["手机号码"], json!("13712345678"));
    assert_eq!(by_row(9).cleaned_data["入职日期"], json!("2023-03-15"));
    assert_eq!(by_row(12).cleaned_data["入职日期"], json!("2023-08-15"));
    assert_eq!(by_row(14).cleaned_data["手机号码"], json!(""));

    // Progress
    assert_eq!(snapshots.first().unwrap().current_phase, Phase::Estimating);
    let last = snapshots.last().unwrap();
    assert_eq!(last.current_phase, Phase::Completed);
    assert_eq!(last.progress_percent, 100);
    assert_eq!(last.processed_rows, 15);
    assert!(snapshots.windows(2).all(|w| w[1].progress_percent >= w[0].progress_percent));
}

#[tokio::test]
async fn test_gbk_roster_matches_utf8() {
    let (bytes, _, had_errors) = encoding_rs::GBK.encode(ROSTER);
    assert!(!had_errors);

    let mut clean = MemorySink::new();
    let mut errors = MemorySink::new();
    let report = IngestPipeline::new(config(100), &mut clean, &mut errors)
        .run_bytes(&bytes)
        .await
        .unwrap();

    assert_eq!(report.format.unwrap().encoding_name(), "GBK");
    assert_eq!(report.headers, vec!["姓名", "手机号码", "地址", "入职日期"]);
    assert_eq!(report.statistics.error_rows, 7);
    assert_eq!(errors.rows().iter().map(|r| r.row_number).collect::<Vec<_>>(), EXCEPTION_ROWS);
}

#[tokio::test]
async fn test_chunked_workers_cover_the_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(dir.path());
    let clean_path = dir.path().join("clean.jsonl");
    let errors_path = dir.path().join("errors.jsonl");
    JsonLinesSink::create(&clean_path).await.unwrap();
    JsonLinesSink::create(&errors_path).await.unwrap();

    // The orchestrator infers once and hands the frozen map to every worker.
    let (mut source, _) = CsvRowSource::open(&input).unwrap();
    let mut sample = Vec::new();
    while let Some(row) = source.next_row() {
        sample.push(row.unwrap());
    }
    let type_map = ColumnInferencer::default().infer(source.headers(), &sample).type_map;

    let ranges = partition_rows(15, 4);
    assert_eq!(ranges.len(), 4);
    let mut total = 0;
    let mut exceptions = 0;
    for range in ranges {
        let mut clean_sink = JsonLinesSink::append_to(&clean_path);
        let mut error_sink = JsonLinesSink::append_to(&errors_path);
        let report = IngestPipeline::new(config(2), &mut clean_sink, &mut error_sink)
            .with_type_map(type_map.clone())
            .with_range(range)
            .run_file(&input)
            .await
            .unwrap();
        assert_eq!(report.statistics.total_rows, range.len());
        total += report.statistics.total_rows;
        exceptions += report.statistics.error_rows;
    }
    assert_eq!(total, 15);
    assert_eq!(exceptions, 7);

    let mut seen: Vec<u64> = read_exception_rows(&errors_path)
        .await
        .unwrap()
        .iter()
        .map(|r| r.row_number)
        .collect();
    let cleaned: Vec<CleanedRow> = read_json_lines(&clean_path).await.unwrap();
    seen.extend(cleaned.iter().map(|r| r.row_number));
    seen.sort_unstable();
    assert_eq!(seen, (1..=15).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_missing_file_fails_before_any_row() {
    let dir = tempfile::tempdir().unwrap();
    let mut clean = MemorySink::new();
    let mut errors = MemorySink::new();
    let failure = IngestPipeline::new(config(10), &mut clean, &mut errors)
        .run_file(dir.path().join("missing.csv"))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, rowclean::PipelineError::Csv(_)));
    assert_eq!(failure.statistics.total_rows, 0);
}
