use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use funnel_insights::aggregate::{
    aggregate_by, compute_period_series, funnel_stages, last_periods, period_changes, summarize,
};
use funnel_insights::filter::{DateWindow, FilterOverrides};
use funnel_insights::logging::{self, LogFormat};
use funnel_insights::models::{
    DateRange, DerivedMetrics, Dimension, FilterSet, FunnelStage, Granularity, MetricKind,
};
use funnel_insights::{filter, ingest, period, ranking, report, yoy, GroupBy};

#[derive(Parser)]
#[command(name = "funnel-insights")]
#[command(
    about = "Lead funnel and conversion analytics for studio lead exports",
    long_about = None
)]
struct Cli {
    /// Lead or client export (.csv or .json)
    #[arg(long)]
    input: PathBuf,
    #[command(flatten)]
    filters: FilterArgs,
    #[command(subcommand)]
    command: Commands,
}

// Without a date flag or filter file only the previous calendar month is kept.
#[derive(Args, Debug)]
struct FilterArgs {
    /// JSON filter set to start from
    #[arg(long = "filters")]
    filter_file: Option<PathBuf>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Drop the date window entirely
    #[arg(long, conflicts_with_all = ["start", "end", "current_month", "months"])]
    all_dates: bool,
    /// Limit to the current calendar month
    #[arg(long, conflicts_with_all = ["start", "end", "months"])]
    current_month: bool,
    /// From the first of the month N months back through the end of this month
    #[arg(long, value_name = "N", conflicts_with_all = ["start", "end"])]
    months: Option<u32>,
    #[arg(long)]
    location: Vec<String>,
    #[arg(long)]
    source: Vec<String>,
    #[arg(long)]
    stage: Vec<String>,
    #[arg(long)]
    status: Vec<String>,
    #[arg(long)]
    associate: Vec<String>,
    #[arg(long)]
    channel: Vec<String>,
    #[arg(long)]
    trial_status: Vec<String>,
    #[arg(long)]
    conversion_status: Vec<String>,
    #[arg(long)]
    retention_status: Vec<String>,
    #[arg(long)]
    is_new: Vec<String>,
    #[arg(long)]
    first_visit_type: Vec<String>,
    #[arg(long)]
    min_ltv: Option<f64>,
    #[arg(long)]
    max_ltv: Option<f64>,
    #[arg(long)]
    min_visits_post_trial: Option<f64>,
    #[arg(long)]
    max_visits_post_trial: Option<f64>,
}

impl FilterArgs {
    fn categories(&self) -> [(Dimension, &Vec<String>); 11] {
        [
            (Dimension::Location, &self.location),
            (Dimension::Source, &self.source),
            (Dimension::Stage, &self.stage),
            (Dimension::Status, &self.status),
            (Dimension::Associate, &self.associate),
            (Dimension::Channel, &self.channel),
            (Dimension::TrialStatus, &self.trial_status),
            (Dimension::ConversionStatus, &self.conversion_status),
            (Dimension::RetentionStatus, &self.retention_status),
            (Dimension::IsNew, &self.is_new),
            (Dimension::FirstVisitType, &self.first_visit_type),
        ]
    }

    fn window(&self) -> Option<DateWindow> {
        if self.all_dates {
            Some(DateWindow::All)
        } else if self.current_month {
            Some(DateWindow::CurrentMonth)
        } else if let Some(months) = self.months {
            Some(DateWindow::TrailingMonths(months))
        } else if self.start.is_some() || self.end.is_some() {
            Some(DateWindow::Between(DateRange {
                start: self.start,
                end: self.end,
            }))
        } else {
            None
        }
    }

    fn overrides(&self) -> FilterOverrides {
        FilterOverrides {
            window: self.window(),
            categories: self
                .categories()
                .into_iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(dimension, values)| (dimension, values.clone()))
                .collect(),
            min_ltv: self.min_ltv,
            max_ltv: self.max_ltv,
            min_visits_post_trial: self.min_visits_post_trial,
            max_visits_post_trial: self.max_visits_post_trial,
        }
    }

    fn build(&self) -> anyhow::Result<FilterSet> {
        let base = match &self.filter_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read filter file {}", path.display()))?;
                let parsed = serde_json::from_str::<FilterSet>(&raw)
                    .with_context(|| format!("invalid filter file {}", path.display()))?;
                Some(parsed)
            }
            None => None,
        };
        Ok(FilterSet::resolve(base, &self.overrides(), period::today()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Headline metrics and funnel stages
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Metrics per value of a dimension
    Group {
        #[arg(long, default_value = "source")]
        by: Dimension,
        #[arg(long)]
        json: bool,
    },
    /// Metrics per time period, oldest first
    Series {
        #[arg(long, default_value = "month")]
        granularity: Granularity,
        /// Only show the most recent N periods
        #[arg(long)]
        last: Option<usize>,
        /// Show one metric with its change from the previous period
        #[arg(long)]
        metric: Option<MetricKind>,
        #[arg(long)]
        json: bool,
    },
    /// Best and worst groups by conversion, LTV and volume
    Rankings {
        #[arg(long, default_value = "source")]
        by: Dimension,
        #[arg(long, default_value_t = ranking::DEFAULT_MIN_SAMPLE)]
        min_sample: u64,
        #[arg(long)]
        json: bool,
    },
    /// Month-by-month year-over-year table
    Yoy {
        #[arg(long, default_value = "source")]
        by: Dimension,
        #[arg(long, default_value = "total")]
        metric: MetricKind,
        #[arg(long)]
        json: bool,
    },
    /// Distinct values available for each filter (ignores active filters)
    Options {
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        /// Label for the report heading, e.g. a studio name
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_metrics_header(label: &str) {
    println!(
        "{:<28} {:>7} {:>7} {:>8} {:>8} {:>10} {:>7}",
        label, "total", "conv", "conv%", "trial%", "avg LTV", "health"
    );
}

fn print_metrics_row(name: &str, metrics: &DerivedMetrics) {
    println!(
        "{:<28} {:>7} {:>7} {:>7.1}% {:>7.1}% {:>10.2} {:>7}",
        name,
        metrics.total,
        metrics.converted,
        metrics.conversion_rate,
        metrics.lead_to_trial_rate,
        metrics.avg_ltv,
        metrics.pipeline_health
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(LogFormat::from_env(), "info");

    let records = ingest::load_records(&cli.input)
        .with_context(|| format!("failed to load records from {}", cli.input.display()))?;
    let filters = cli.filters.build()?;
    let filtered = filter::filter_records(&records, &filters);
    tracing::info!(
        loaded = records.len(),
        kept = filtered.len(),
        window = %filters.date_range,
        "applied filters"
    );

    match cli.command {
        Commands::Summary { json } => {
            let metrics = summarize(&filtered);
            let stages = funnel_stages(&filtered);
            if json {
                #[derive(Serialize)]
                struct Summary<'a> {
                    metrics: &'a DerivedMetrics,
                    funnel: &'a [FunnelStage],
                }
                return print_json(&Summary {
                    metrics: &metrics,
                    funnel: &stages,
                });
            }

            println!("Records in window: {} of {}", filtered.len(), records.len());
            println!("Window: {}", filters.date_range);
            print_metrics_header("");
            print_metrics_row("all", &metrics);
            println!("Pipeline health: {}/100", metrics.pipeline_health);
            for stage in stages {
                println!(
                    "- {}: {} ({:.1}%, drop-off {})",
                    stage.name, stage.count, stage.share_of_leads, stage.drop_off
                );
            }
        }
        Commands::Group { by, json } => {
            let groups = aggregate_by(&filtered, GroupBy::Category(by));
            if json {
                return print_json(&groups);
            }
            if groups.is_empty() {
                println!("No records match these filters.");
                return Ok(());
            }
            print_metrics_header(by.as_str());
            for (name, metrics) in &groups {
                print_metrics_row(name, metrics);
            }
        }
        Commands::Series {
            granularity,
            last,
            metric,
            json,
        } => {
            let series = compute_period_series(&filtered, granularity);
            if let Some(metric) = metric {
                // Changes are taken over the full series so the first shown
                // period still compares against its predecessor.
                let changes = period_changes(&series, metric);
                let skip = last.map_or(0, |count| changes.len().saturating_sub(count));
                let shown = &changes[skip..];
                if json {
                    return print_json(&shown);
                }
                if shown.is_empty() {
                    println!("No dated records match these filters.");
                    return Ok(());
                }
                println!(
                    "{:<12} {:>14} {:>14} {:>10}",
                    granularity.as_str(),
                    metric.as_str(),
                    "change",
                    "% change"
                );
                for row in shown {
                    let change = row.change.map_or("n/a".to_string(), |c| format!("{c:+.2}"));
                    println!(
                        "{:<12} {:>14.2} {:>14} {:>10}",
                        row.period,
                        row.value,
                        change,
                        report::format_growth(row.growth)
                    );
                }
                return Ok(());
            }

            let shown = match last {
                Some(count) => last_periods(&series, count),
                None => &series[..],
            };
            if json {
                return print_json(&shown);
            }
            if shown.is_empty() {
                println!("No dated records match these filters.");
                return Ok(());
            }
            print_metrics_header(granularity.as_str());
            for point in shown {
                print_metrics_row(&point.period, &point.metrics);
            }
        }
        Commands::Rankings {
            by,
            min_sample,
            json,
        } => {
            let rankings = ranking::rank_groups(&filtered, by, min_sample);
            if json {
                return print_json(&rankings);
            }
            if rankings.top.is_empty() {
                println!("No {by} value has at least {min_sample} records in this window.");
                return Ok(());
            }
            let sections = [
                ("Top by conversion", &rankings.top),
                ("Bottom by conversion", &rankings.bottom),
                ("Top by average LTV", &rankings.top_ltv),
                ("Top by volume", &rankings.top_volume),
            ];
            for (title, groups) in sections {
                println!("{title}:");
                print_metrics_header(by.as_str());
                for group in groups {
                    print_metrics_row(&group.name, &group.metrics);
                }
                println!();
            }
        }
        Commands::Yoy { by, metric, json } => {
            let table = yoy::year_on_year(&filtered, by, metric);
            if json {
                return print_json(&table);
            }
            if table.rows.is_empty() {
                println!("No dated records match these filters.");
                return Ok(());
            }
            let years: Vec<String> = table.years.iter().map(|y| format!("{y:>10}")).collect();
            let heading = format!("{by} / month");
            println!("{:<36}{} {:>10}", heading, years.join(""), "growth");
            for row in &table.rows {
                let values: Vec<String> = row
                    .cells
                    .iter()
                    .map(|cell| format!("{:>10}", cell.total))
                    .collect();
                println!(
                    "{:<36}{} {:>10}",
                    format!("{} - {}", row.group, row.month_name),
                    values.join(""),
                    report::format_growth(row.growth)
                );
            }
            println!("(cells show totals; growth compares {metric})");
        }
        Commands::Options { json } => {
            let options: BTreeMap<Dimension, Vec<String>> = filter::filter_options(&records);
            if json {
                return print_json(&options);
            }
            for (dimension, values) in &options {
                println!("{dimension}: {}", values.join(", "));
            }
        }
        Commands::Report { label, out } => {
            let output = report::build_report(label.as_deref(), &filters, &filtered);
            std::fs::write(&out, output)
                .with_context(|| format!("failed to write report to {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
