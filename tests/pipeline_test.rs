use chrono::{NaiveDate, NaiveDateTime};
use dashboard_metrics::aggregate::{aggregate, AggregateSpec, Dimension, Measure, Reducer};
use dashboard_metrics::config::Fallback;
use dashboard_metrics::loader::{load_orders, load_transactions};
use dashboard_metrics::pivot::{pivot, PivotOrder};
use dashboard_metrics::reports::{self, *};
use dashboard_metrics::util::DecimalConvention;
use dashboard_metrics::{Activity, PipelineConfig, PipelineError, Status, WindowSelector};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use tempfile::NamedTempFile;

const TX_HEADER: &str = "id,purchase_date,product_name,price,cost,client_id,email,sale_type,gender,origin_campaign";
const ORDER_HEADER: &str = "order_id,customer_id,order_date,amount,returned,satisfaction";

fn csv_file(header: &str, rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", header).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file.flush().unwrap();
    file
}

fn reference_time() -> NaiveDateTime {
    // Wednesday
    NaiveDate::from_ymd_opt(2024, 3, 13).unwrap().and_hms_opt(18, 0, 0).unwrap()
}

fn sales_file() -> NamedTempFile {
    csv_file(
        TX_HEADER,
        &[
            "1,2024-01-10,Lamp,100,40,c1,ana@shop.io,Online,Female,Spring",
            "2,2024-01-22,Desk,50,10,c2,,In-Store,Male,Summer",
            "3,2024-02-02,Lamp,80,30,c1,ana@shop.io,Online,Female,Spring",
            "4,2024-02-15,Chair,45.5,20,c3,bo@shop.io,Online,na,Spring",
            "5,2024-02-28,Lamp,80,30,c2,,In-Store,Male,Summer",
            "6,2024-03-04,Desk,60,12,c3,bo@shop.io,Online,na,Winter",
            "7,2024-03-11,Lamp,90,35,c1,ana@shop.io,Online,Female,Spring",
            "8,2024-03-13,Chair,40,18,c2,,In-Store,Male,Summer",
        ],
    )
}

#[test]
fn ecommerce_catalog_from_csv() {
    let file = sales_file();
    let (records, report) = load_transactions(file.path()).unwrap();
    assert_eq!(report.total_rows, 8);
    assert_eq!(report.decimal_convention, DecimalConvention::Dot);

    let config = PipelineConfig::default();
    let catalog = reports::ecommerce(&records, &WindowSelector::new(reference_time()), &config).unwrap();

    let gross_prev = catalog.scalar(GROSS_SALES_PREVIOUS_MONTH).unwrap();
    assert_eq!(gross_prev.value, dec!(205.5));
    assert_eq!(gross_prev.activity, Activity::Observed);
    assert_eq!(catalog.scalar(NET_SALES_PREVIOUS_MONTH).unwrap().value, dec!(125.5));
    assert_eq!(catalog.scalar(GROSS_SALES_CURRENT_MONTH).unwrap().value, dec!(190));

    let net = catalog.series(NET_REVENUE_BY_MONTH).unwrap();
    assert_eq!(net.points.len(), 7);
    assert_eq!(net.value("2024-01"), Some(dec!(100)));
    assert_eq!(net.value("2023-12"), Some(Decimal::ZERO));

    let top = catalog.table(TOP_PRODUCTS_PREVIOUS_MONTH).unwrap();
    assert_eq!(top.rows, vec!["Lamp", "Chair"]);
    assert_eq!(top.cell("Lamp", "Units"), Some(dec!(2)));
    assert_eq!(top.cell("Chair", "Total"), Some(dec!(46)));

    let clients = catalog.table(TOP_CLIENTS_PREVIOUS_MONTH).unwrap();
    assert_eq!(clients.rows[0], "ana@shop.io");

    let users = catalog.table(ACTIVE_USERS_BY_MONTH).unwrap();
    assert_eq!(users.rows.len(), 6);
    assert_eq!(users.columns, vec!["Total", "Male", "Female", "Unknown"]);
    assert_eq!(users.cell("2024-02", "Total"), Some(dec!(3)));
    assert_eq!(users.cell("2024-02", "Unknown"), Some(dec!(1)));
    assert_eq!(users.cell("2023-09", "Total"), Some(Decimal::ZERO));

    let genders = catalog.series(GENDER_DISTRIBUTION).unwrap();
    assert_eq!(genders.total(), dec!(8));
}

#[test]
fn empty_window_yields_zero_with_no_activity_flag() {
    let file = sales_file();
    let (records, _) = load_transactions(file.path()).unwrap();
    // Two years later nothing falls into the month windows.
    let later = NaiveDate::from_ymd_opt(2026, 6, 3).unwrap().and_hms_opt(8, 0, 0).unwrap();
    let catalog = reports::ecommerce(&records, &WindowSelector::new(later), &PipelineConfig::default()).unwrap();

    let current = catalog.scalar(GROSS_SALES_CURRENT_MONTH).unwrap();
    assert_eq!(current.value, Decimal::ZERO);
    assert_eq!(current.activity, Activity::NoActivity);
    assert_eq!(catalog.series(NET_REVENUE_BY_MONTH).unwrap().activity, Activity::NoActivity);
    assert!(catalog.table(TOP_PRODUCTS_PREVIOUS_MONTH).is_some());
}

#[test]
fn missing_fallback_fails_before_catalog_exists() {
    let file = sales_file();
    let (records, _) = load_transactions(file.path()).unwrap();
    let later = NaiveDate::from_ymd_opt(2026, 6, 3).unwrap().and_hms_opt(8, 0, 0).unwrap();
    let mut config = PipelineConfig::default();
    config.catalog.metrics.insert(GROSS_SALES_CURRENT_MONTH.to_string(), Fallback::None);

    match reports::ecommerce(&records, &WindowSelector::new(later), &config) {
        Err(PipelineError::IncompleteMetric { name }) => assert_eq!(name, GROSS_SALES_CURRENT_MONTH),
        other => panic!("expected IncompleteMetric, got {other:?}"),
    }
}

#[test]
fn decimal_comma_dataset() {
    let file = csv_file(
        TX_HEADER,
        &[
            "1,2024-02-10,Lamp,\"12,50\",\"2,25\",c1,,Online,Male,Spring",
            "2,2024-02-11,Desk,12.50,1,c2,,Online,Female,Spring",
        ],
    );
    let (records, report) = load_transactions(file.path()).unwrap();
    assert_eq!(report.decimal_convention, DecimalConvention::Comma);
    assert!(report.mixed_separators);
    assert_eq!(records[0].price, dec!(12.50));
    assert_eq!(records[0].cost, dec!(2.25));
    assert_eq!(records[1].price, dec!(12.50));
}

#[test]
fn missing_required_column_is_schema_error() {
    let file = csv_file("purchase_date,product_name,price,client_id", &["2024-01-01,Lamp,1,c1"]);
    assert!(matches!(load_transactions(file.path()), Err(PipelineError::Schema { .. })));
}

#[test]
fn product_performance_catalog() {
    let file = sales_file();
    let (records, _) = load_transactions(file.path()).unwrap();
    let catalog = reports::product_performance(&records, &PipelineConfig::default()).unwrap();

    let by_product = catalog.series(REVENUE_BY_PRODUCT).unwrap();
    assert_eq!(by_product.value("Lamp"), Some(dec!(350)));

    let online = catalog.series(ONLINE_REVENUE_BY_MONTH).unwrap();
    let buckets: Vec<&str> = online.points.iter().map(|p| p.bucket.as_str()).collect();
    assert_eq!(buckets, vec!["Jan", "Feb", "Mar"]);
    assert_eq!(online.value("Mar"), Some(dec!(150)));

    let in_store = catalog.series(IN_STORE_REVENUE_BY_MONTH).unwrap();
    assert_eq!(in_store.value("Feb"), Some(dec!(80)));

    let cost = catalog.table(COST_BY_PRODUCT_MONTH).unwrap();
    assert_eq!(cost.rows, vec!["Jan", "Feb", "Mar"]);
    assert_eq!(cost.cell("Feb", "Lamp"), Some(dec!(60)));
    assert_eq!(cost.cell("Jan", "Chair"), Some(Decimal::ZERO));

    // Summing each pivoted row recovers the per-month cost total.
    let total_cost: Decimal = records.iter().map(|r| r.cost).sum();
    let pivot_total: Decimal = (0..cost.rows.len()).map(|i| cost.row_total(i)).sum();
    assert_eq!(pivot_total, total_cost);
}

#[test]
fn satisfaction_catalog_from_csv() {
    let file = csv_file(
        ORDER_HEADER,
        &[
            "o1,c1,2024-01-05,100.40,no,5",
            "o2,c1,2024-01-20,20.50,yes,2",
            "o3,c2,2024-02-03,60,no,4",
            "o4,c3,2024-04-01,19.50,yes,1",
        ],
    );
    let (orders, _) = load_orders(file.path()).unwrap();
    let config = PipelineConfig::default();
    let catalog = reports::customer_satisfaction(&orders, &config).unwrap();

    assert_eq!(catalog.scalar(TOTAL_CUSTOMERS).unwrap().value, dec!(3));
    assert_eq!(catalog.scalar(TOTAL_ORDERS).unwrap().value, dec!(4));

    let orders_rate = catalog.scalar(ORDERS_WITH_RETURNS).unwrap();
    assert_eq!(orders_rate.value, dec!(0.5));
    assert_eq!(orders_rate.status, Some(Status::Critical));
    let customers_rate = catalog.scalar(CUSTOMERS_WITH_RETURNS).unwrap();
    assert!(customers_rate.value <= Decimal::ONE && customers_rate.value >= Decimal::ZERO);

    // 20.50 + 19.50 = 40 exactly
    assert_eq!(catalog.scalar(REVENUE_LOST).unwrap().value, dec!(40));
    assert_eq!(catalog.scalar(TOTAL_REVENUE).unwrap().value, dec!(200));
    assert_eq!(catalog.scalar(REAL_REVENUE).unwrap().value, dec!(160));
    assert_eq!(catalog.scalar(REVENUE_LOST_SHARE).unwrap().value, dec!(0.2));

    let avg = catalog.scalar(AVERAGE_SATISFACTION).unwrap();
    assert_eq!(avg.value, dec!(3));
    assert_eq!(avg.status, Some(Status::Warning));

    let distribution = catalog.series(CUSTOMER_SATISFACTION).unwrap();
    assert_eq!(distribution.points.len(), 5);
    assert_eq!(distribution.value("Neutral"), Some(Decimal::ZERO));
    assert_eq!(distribution.value("Very satisfied"), Some(dec!(1)));

    let monthly_scores = catalog.series(ORDER_SATISFACTION).unwrap();
    assert_eq!(monthly_scores.value("2024-01"), Some(dec!(3.5)));
    assert_eq!(monthly_scores.value("2024-03"), Some(Decimal::ZERO));

    let monthly = catalog.table(MONTHLY_METRICS).unwrap();
    assert_eq!(monthly.rows, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
    assert_eq!(monthly.cell("2024-01", "Orders"), Some(dec!(2)));
    assert_eq!(monthly.cell("2024-01", "Returned Orders"), Some(dec!(1)));
    assert_eq!(monthly.cell("2024-01", "Real Revenue"), Some(dec!(100)));
    assert_eq!(monthly.cell("2024-01", "Revenue Lost"), Some(dec!(20)));
    assert_eq!(monthly.cell("2024-04", "Revenue Lost"), Some(dec!(20)));
}

#[test]
fn satisfaction_without_orders_is_zero_filled() {
    let catalog = reports::customer_satisfaction(&[], &PipelineConfig::default()).unwrap();
    let lost = catalog.scalar(REVENUE_LOST).unwrap();
    assert_eq!(lost.value, Decimal::ZERO);
    assert_eq!(lost.activity, Activity::NoActivity);
    assert_eq!(catalog.scalar(ORDERS_WITH_RETURNS).unwrap().value, Decimal::ZERO);
}

#[test]
fn pivot_rows_recover_aggregate_totals() {
    let file = sales_file();
    let (records, _) = load_transactions(file.path()).unwrap();
    let by_pair = AggregateSpec::new([Dimension::Month, Dimension::Campaign], Reducer::Sum(Measure::Price));
    let by_month = AggregateSpec::new([Dimension::Month], Reducer::Sum(Measure::Price));
    let table = pivot(&aggregate(&records, &by_pair).unwrap(), 0, 1, &PivotOrder::default()).unwrap();
    let months = aggregate(&records, &by_month).unwrap();
    for (i, label) in table.rows.iter().enumerate() {
        assert_eq!(table.row_total(i), months.get(&[label.as_str()]).unwrap().value);
    }
    let input: Decimal = records.iter().map(|r| r.price).sum();
    assert_eq!(months.total(), input);
}

#[test]
fn shipped_config_and_sample_data_run() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = PipelineConfig::from_path(root.join("config/dashboards.toml")).unwrap();
    assert_eq!(config.catalog.for_metric("total_revenue"), Fallback::None);

    let (records, report) = load_transactions(root.join(&config.input.transactions)).unwrap();
    assert_eq!(report.decimal_convention, DecimalConvention::Comma);
    let (orders, _) = load_orders(root.join(&config.input.orders)).unwrap();

    let selector = WindowSelector::new(reference_time());
    let sales = reports::ecommerce(&records, &selector, &config).unwrap();
    assert_eq!(sales.scalar(GROSS_SALES_PREVIOUS_MONTH).unwrap().value, dec!(663.40));
    reports::product_performance(&records, &config).unwrap();
    let satisfaction = reports::customer_satisfaction(&orders, &config).unwrap();
    assert_eq!(satisfaction.scalar(REVENUE_LOST).unwrap().value, dec!(614));
}
