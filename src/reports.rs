// Dashboard assembly: one function per dashboard, each a pure
// `records -> MetricCatalog` run over the pipeline stages.
use crate::aggregate::{aggregate, Aggregate, AggregateRow, AggregateSpec, Dimension, GroupKey, Measure, Reducer, SortOrder};
use crate::catalog::{CatalogBuilder, CatalogSchema, MetricCatalog, MetricDecl, MetricSeries};
use crate::config::PipelineConfig;
use crate::derive::{self, DerivedMetric, Unit};
use crate::error::Result;
use crate::pivot::{activity_of, merge_columns, pivot, PivotOrder, PivotTable};
use crate::types::{OrderRecord, SaleType, TransactionRecord, SATISFACTION_LABELS};
use crate::util::{round_half_even, CALENDAR_MONTHS, WEEKDAYS};
use crate::window::{Activity, TimeWindow, WindowSelector};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

pub const GROSS_SALES_PREVIOUS_MONTH: &str = "gross_sales_previous_month";
pub const NET_SALES_PREVIOUS_MONTH: &str = "net_sales_previous_month";
pub const GROSS_SALES_CURRENT_MONTH: &str = "gross_sales_current_month";
pub const NET_REVENUE_BY_MONTH: &str = "net_revenue_by_month";
pub const REVENUE_BY_WEEKDAY: &str = "revenue_by_weekday";
pub const TOP_PRODUCTS_PREVIOUS_MONTH: &str = "top_products_previous_month";
pub const TOP_CLIENTS_PREVIOUS_MONTH: &str = "top_clients_previous_month";
pub const GENDER_DISTRIBUTION: &str = "gender_distribution";
pub const ACTIVE_USERS_BY_MONTH: &str = "active_users_by_month";

pub const REVENUE_BY_PRODUCT: &str = "revenue_by_product";
pub const ONLINE_REVENUE_BY_MONTH: &str = "online_revenue_by_month";
pub const IN_STORE_REVENUE_BY_MONTH: &str = "in_store_revenue_by_month";
pub const REVENUE_BY_CAMPAIGN: &str = "revenue_by_campaign";
pub const REVENUE_BY_CAMPAIGN_K: &str = "revenue_by_campaign_k";
pub const COST_BY_PRODUCT_MONTH: &str = "cost_by_product_month";

pub const TOTAL_CUSTOMERS: &str = "total_customers";
pub const CUSTOMERS_WITH_RETURNS: &str = "customers_with_returns";
pub const TOTAL_ORDERS: &str = "total_orders";
pub const ORDERS_WITH_RETURNS: &str = "orders_with_returns";
pub const CUSTOMER_SATISFACTION: &str = "customer_satisfaction";
pub const ORDER_SATISFACTION: &str = "order_satisfaction";
pub const AVERAGE_SATISFACTION: &str = "average_satisfaction";
pub const TOTAL_REVENUE: &str = "total_revenue";
pub const REVENUE_LOST: &str = "revenue_lost";
pub const REAL_REVENUE: &str = "real_revenue";
pub const REVENUE_LOST_SHARE: &str = "revenue_lost_share";
pub const MONTHLY_METRICS: &str = "monthly_metrics";

pub const LAST_WEEK: &str = "Last week";
pub const CURRENT_WEEK: &str = "Current week";

pub fn ecommerce_schema() -> CatalogSchema {
    CatalogSchema {
        dashboard: "ecommerce_sales_users",
        metrics: vec![
            MetricDecl::scalar(GROSS_SALES_PREVIOUS_MONTH, Unit::Currency),
            MetricDecl::scalar(NET_SALES_PREVIOUS_MONTH, Unit::Currency),
            MetricDecl::scalar(GROSS_SALES_CURRENT_MONTH, Unit::Currency),
            MetricDecl::series(NET_REVENUE_BY_MONTH, Unit::Currency),
            MetricDecl::table(REVENUE_BY_WEEKDAY, Unit::Currency),
            MetricDecl::table(TOP_PRODUCTS_PREVIOUS_MONTH, Unit::Currency),
            MetricDecl::table(TOP_CLIENTS_PREVIOUS_MONTH, Unit::Currency),
            MetricDecl::series(GENDER_DISTRIBUTION, Unit::Count),
            MetricDecl::table(ACTIVE_USERS_BY_MONTH, Unit::Count),
        ],
    }
}

pub fn product_performance_schema() -> CatalogSchema {
    CatalogSchema {
        dashboard: "sales_product_performance",
        metrics: vec![
            MetricDecl::series(REVENUE_BY_PRODUCT, Unit::Currency),
            MetricDecl::series(ONLINE_REVENUE_BY_MONTH, Unit::Currency),
            MetricDecl::series(IN_STORE_REVENUE_BY_MONTH, Unit::Currency),
            MetricDecl::series(REVENUE_BY_CAMPAIGN, Unit::Currency),
            MetricDecl::series(REVENUE_BY_CAMPAIGN_K, Unit::Currency),
            MetricDecl::table(COST_BY_PRODUCT_MONTH, Unit::Currency),
        ],
    }
}

pub fn satisfaction_schema() -> CatalogSchema {
    CatalogSchema {
        dashboard: "customer_satisfaction_performance",
        metrics: vec![
            MetricDecl::scalar(TOTAL_CUSTOMERS, Unit::Count),
            MetricDecl::scalar(CUSTOMERS_WITH_RETURNS, Unit::Percent),
            MetricDecl::scalar(TOTAL_ORDERS, Unit::Count),
            MetricDecl::scalar(ORDERS_WITH_RETURNS, Unit::Percent),
            MetricDecl::series(CUSTOMER_SATISFACTION, Unit::Count),
            MetricDecl::series(ORDER_SATISFACTION, Unit::Score),
            MetricDecl::scalar(AVERAGE_SATISFACTION, Unit::Score),
            MetricDecl::scalar(TOTAL_REVENUE, Unit::Currency),
            MetricDecl::scalar(REVENUE_LOST, Unit::Currency),
            MetricDecl::scalar(REAL_REVENUE, Unit::Currency),
            MetricDecl::scalar(REVENUE_LOST_SHARE, Unit::Percent),
            MetricDecl::table(MONTHLY_METRICS, Unit::Currency),
        ],
    }
}

/// Sales and users dashboard. Every window is relative to `selector`'s
/// reference timestamp.
pub fn ecommerce(
    records: &[TransactionRecord],
    selector: &WindowSelector,
    config: &PipelineConfig,
) -> Result<MetricCatalog> {
    let mut builder = CatalogBuilder::new(ecommerce_schema(), &config.catalog);

    let previous_month = selector.previous_month().filter(records);
    let current_month = selector.current_month().filter(records);
    builder.scalar(derive::gross_sales(GROSS_SALES_PREVIOUS_MONTH, previous_month.iter())?)?;
    builder.scalar(derive::net_revenue(NET_SALES_PREVIOUS_MONTH, previous_month.iter())?)?;
    builder.scalar(derive::gross_sales(GROSS_SALES_CURRENT_MONTH, current_month.iter())?)?;

    let trailing = selector.trailing_months(config.ecommerce.trailing_months);
    let current = selector.current_month();
    let mut months = trailing.clone();
    months.push(current.clone());
    if let Some(span) = TimeWindow::span("net_revenue_months", &months) {
        let slice = span.filter(records);
        let spec = AggregateSpec::new([Dimension::Month], Reducer::Sum(Measure::NetRevenue))
            .dense_months(span.start_date(), current.start_date());
        let by_month = aggregate(slice.iter(), &spec)?;
        builder.series(MetricSeries::from_aggregate(NET_REVENUE_BY_MONTH, &by_month, Unit::Currency))?;
    }

    builder.table(REVENUE_BY_WEEKDAY, week_over_week(records, selector)?)?;

    let top_products = AggregateSpec::new([Dimension::Product], Reducer::Sum(Measure::Price))
        .sorted(SortOrder::Descending);
    let products = aggregate(previous_month.iter(), &top_products)?.top_n(config.ecommerce.top_n);
    builder.table(TOP_PRODUCTS_PREVIOUS_MONTH, totals_and_units("Product", &products, |key| key.to_string()))?;

    let top_clients = AggregateSpec::new([Dimension::Client], Reducer::Sum(Measure::Price))
        .sorted(SortOrder::Descending);
    let clients = aggregate(previous_month.iter(), &top_clients)?.top_n(config.ecommerce.top_n);
    let emails = client_emails(previous_month.iter());
    builder.table(
        TOP_CLIENTS_PREVIOUS_MONTH,
        totals_and_units("Client", &clients, |id| emails.get(id).copied().unwrap_or(id).to_string()),
    )?;

    let genders = aggregate(records, &AggregateSpec::new([Dimension::Gender], Reducer::Count))?;
    builder.series(MetricSeries::from_aggregate(GENDER_DISTRIBUTION, &genders, Unit::Count))?;

    builder.table(ACTIVE_USERS_BY_MONTH, active_users(records, &trailing)?)?;

    info!(
        previous_month = %previous_month.window.label,
        current_month = %current_month.window.label,
        "ecommerce metrics derived"
    );
    builder.build()
}

/// Revenue per weekday for the previous and the current week, merged side
/// by side on the weekday. Days of the current week that have not happened
/// yet read zero.
fn week_over_week(records: &[TransactionRecord], selector: &WindowSelector) -> Result<PivotTable> {
    let spec = AggregateSpec::new([Dimension::Weekday], Reducer::Sum(Measure::Price));
    let last = aggregate(selector.previous_week().filter(records).iter(), &spec)?;
    let this = aggregate(selector.current_week().filter(records).iter(), &spec)?;
    let weekdays: Vec<String> = WEEKDAYS.iter().map(|d| d.to_string()).collect();
    Ok(merge_columns("Weekday", &[(LAST_WEEK, &last), (CURRENT_WEEK, &this)], Some(&weekdays)))
}

/// Transactions per month and gender over `months`, with a leading total.
fn active_users(records: &[TransactionRecord], months: &[TimeWindow]) -> Result<PivotTable> {
    let Some(span) = TimeWindow::span("active_users", months) else {
        return Ok(PivotTable::empty("Month", Vec::new()));
    };
    let slice = span.filter(records);
    let spec = AggregateSpec::new([Dimension::Month, Dimension::Gender], Reducer::Count);
    let agg = aggregate(slice.iter(), &spec)?;
    let labels: Vec<&str> = months.iter().map(|w| w.label.as_str()).collect();
    let order = PivotOrder::default()
        .rows(&labels[..])
        .columns(&["Male", "Female", "Unknown"][..]);
    Ok(pivot(&agg, 0, 1, &order)?.with_total_column("Total"))
}

/// First non-empty e-mail seen for each client id.
fn client_emails<'a>(records: impl IntoIterator<Item = &'a TransactionRecord>) -> HashMap<&'a str, &'a str> {
    let mut emails = HashMap::new();
    for record in records {
        if let Some(email) = record.email.as_deref().filter(|e| !e.is_empty()) {
            emails.entry(record.client_id.as_str()).or_insert(email);
        }
    }
    emails
}

/// Rounded totals next to the number of contributing records, one row per
/// group with its key passed through `label`.
fn totals_and_units(row_dimension: &str, agg: &Aggregate, label: impl Fn(&str) -> String) -> PivotTable {
    PivotTable {
        row_dimension: row_dimension.to_string(),
        rows: agg.rows.iter().map(|r| label(&r.key.label())).collect(),
        columns: vec!["Total".to_string(), "Units".to_string()],
        cells: agg
            .rows
            .iter()
            .map(|r| vec![round_half_even(r.value), Decimal::from(r.count)])
            .collect(),
        activity: activity_of(&[agg]),
    }
}

fn calendar_index(label: &str) -> usize {
    CALENDAR_MONTHS.iter().position(|m| *m == label).unwrap_or(CALENDAR_MONTHS.len())
}

fn in_calendar_order(mut agg: Aggregate) -> Aggregate {
    agg.rows.sort_by_key(|r| calendar_index(r.key.part(0)));
    agg
}

/// Product performance dashboard over the whole record set.
pub fn product_performance(records: &[TransactionRecord], config: &PipelineConfig) -> Result<MetricCatalog> {
    let mut builder = CatalogBuilder::new(product_performance_schema(), &config.catalog);

    let by_product = aggregate(records, &AggregateSpec::new([Dimension::Product], Reducer::Sum(Measure::Price)))?;
    builder.series(MetricSeries::from_aggregate(REVENUE_BY_PRODUCT, &by_product, Unit::Currency))?;

    let by_month = AggregateSpec::new([Dimension::CalendarMonth], Reducer::Sum(Measure::Price));
    for (sale_type, name) in [
        (SaleType::Online, ONLINE_REVENUE_BY_MONTH),
        (SaleType::InStore, IN_STORE_REVENUE_BY_MONTH),
    ] {
        let channel = records.iter().filter(|r| r.sale_type == sale_type);
        let agg = in_calendar_order(aggregate(channel, &by_month)?);
        builder.series(MetricSeries::from_aggregate(name, &agg, Unit::Currency))?;
    }

    let by_campaign = aggregate(records, &AggregateSpec::new([Dimension::Campaign], Reducer::Sum(Measure::Price)))?;
    let campaign = MetricSeries::from_aggregate(REVENUE_BY_CAMPAIGN, &by_campaign, Unit::Currency);
    let thousands = campaign
        .clone()
        .rename(REVENUE_BY_CAMPAIGN_K)
        .map_values(|v| round_half_even(v / Decimal::ONE_THOUSAND));
    builder.series(campaign)?;
    builder.series(thousands)?;

    let cost_spec = AggregateSpec::new([Dimension::CalendarMonth, Dimension::Product], Reducer::Sum(Measure::Cost));
    let cost = aggregate(records, &cost_spec)?;
    let mut months: Vec<&str> = Vec::new();
    for row in &cost.rows {
        if !months.contains(&row.key.part(0)) {
            months.push(row.key.part(0));
        }
    }
    months.sort_by_key(|m| calendar_index(m));
    let table = pivot(&cost, 0, 1, &PivotOrder::default().rows(&months[..]))?;
    builder.table(COST_BY_PRODUCT_MONTH, table)?;

    info!(products = by_product.rows.len(), campaigns = by_campaign.rows.len(), "product metrics derived");
    builder.build()
}

/// Customer satisfaction dashboard over order-level records.
pub fn customer_satisfaction(orders: &[OrderRecord], config: &PipelineConfig) -> Result<MetricCatalog> {
    let mut builder = CatalogBuilder::new(satisfaction_schema(), &config.catalog);
    let activity = if orders.is_empty() { Activity::NoActivity } else { Activity::Observed };
    let return_bands = &config.thresholds.return_rate;

    let customers = aggregate(orders, &AggregateSpec::new([Dimension::Client], Reducer::Count))?;
    builder.scalar(DerivedMetric::new(
        TOTAL_CUSTOMERS,
        Decimal::from(customers.rows.len()),
        Unit::Count,
        activity,
    ))?;
    builder.scalar(
        DerivedMetric::new(
            CUSTOMERS_WITH_RETURNS,
            derive::customers_with_returns_rate(orders),
            Unit::Percent,
            activity,
        )
        .with_status(return_bands),
    )?;
    builder.scalar(DerivedMetric::new(TOTAL_ORDERS, Decimal::from(orders.len()), Unit::Count, activity))?;
    builder.scalar(
        DerivedMetric::new(ORDERS_WITH_RETURNS, derive::orders_with_returns_rate(orders), Unit::Percent, activity)
            .with_status(return_bands),
    )?;

    let by_label = aggregate(orders, &AggregateSpec::new([Dimension::Satisfaction], Reducer::Count))?;
    let distribution = Aggregate {
        group_by: by_label.group_by.clone(),
        rows: SATISFACTION_LABELS
            .iter()
            .map(|label| {
                by_label.get(&[*label]).cloned().unwrap_or(AggregateRow {
                    key: GroupKey(vec![label.to_string()]),
                    value: Decimal::ZERO,
                    count: 0,
                })
            })
            .collect(),
    };
    builder.series(MetricSeries::from_aggregate(CUSTOMER_SATISFACTION, &distribution, Unit::Count))?;

    let first = orders.iter().map(|o| o.order_date).min();
    let last = orders.iter().map(|o| o.order_date).max();
    let monthly = |reducer: Reducer| -> AggregateSpec {
        let spec = AggregateSpec::new([Dimension::Month], reducer);
        match (first, last) {
            (Some(from), Some(to)) => spec.dense_months(from, to),
            _ => spec,
        }
    };

    let score_sum = aggregate(orders, &monthly(Reducer::Sum(Measure::Score)))?;
    let mut scores = MetricSeries::from_aggregate(ORDER_SATISFACTION, &score_sum, Unit::Score);
    for (point, row) in scores.points.iter_mut().zip(&score_sum.rows) {
        point.value = derive::average(row.value, row.count).round_dp(2);
    }
    builder.series(scores)?;

    let total_score = derive::sum_measure(orders, Measure::Score)?;
    builder.scalar(
        DerivedMetric::new(
            AVERAGE_SATISFACTION,
            derive::average(total_score, orders.len()).round_dp(2),
            Unit::Score,
            activity,
        )
        .with_status(&config.thresholds.satisfaction),
    )?;

    let total_revenue = round_half_even(derive::sum_measure(orders, Measure::Amount)?);
    let lost = derive::revenue_lost(orders)?;
    builder.scalar(DerivedMetric::new(TOTAL_REVENUE, total_revenue, Unit::Currency, activity))?;
    builder.scalar(DerivedMetric::new(REVENUE_LOST, lost, Unit::Currency, activity))?;
    builder.scalar(DerivedMetric::new(
        REAL_REVENUE,
        (total_revenue - lost).max(Decimal::ZERO),
        Unit::Currency,
        activity,
    ))?;
    builder.scalar(DerivedMetric::new(
        REVENUE_LOST_SHARE,
        derive::share(lost, total_revenue),
        Unit::Percent,
        activity,
    ))?;

    builder.table(MONTHLY_METRICS, monthly_metrics(orders, &monthly)?)?;

    info!(orders = orders.len(), customers = customers.rows.len(), "satisfaction metrics derived");
    builder.build()
}

fn monthly_metrics(orders: &[OrderRecord], monthly: &dyn Fn(Reducer) -> AggregateSpec) -> Result<PivotTable> {
    let count_spec = monthly(Reducer::Count);
    let placed = aggregate(orders, &count_spec)?;
    let returned_orders: Vec<&OrderRecord> = orders.iter().filter(|o| o.returned).collect();
    let returned = aggregate(returned_orders, &count_spec)?;
    let amount = aggregate(orders, &monthly(Reducer::Sum(Measure::Amount)))?;
    let lost = aggregate(orders, &monthly(Reducer::Sum(Measure::ReturnedAmount)))?;

    let lost_rounded = rounded(&lost, |r| r.value);
    let real = rounded(&amount, |r| {
        let lost = lost.get(&[r.key.part(0)]).map(|l| l.value).unwrap_or(Decimal::ZERO);
        r.value - lost
    });

    Ok(merge_columns(
        "Month",
        &[
            ("Orders", &placed),
            ("Returned Orders", &returned),
            ("Real Revenue", &real),
            ("Revenue Lost", &lost_rounded),
        ],
        None,
    ))
}

/// Same keys, values replaced by `f` and rounded to whole currency units.
fn rounded(agg: &Aggregate, f: impl Fn(&AggregateRow) -> Decimal) -> Aggregate {
    Aggregate {
        group_by: agg.group_by.clone(),
        rows: agg
            .rows
            .iter()
            .map(|r| AggregateRow { key: r.key.clone(), value: round_half_even(f(r)), count: r.count })
            .collect(),
    }
}
