use chrono::NaiveDate;
use clap::Parser;
use log::{info, LevelFilter};
use mortgage::mortgage::{calculate_mortgage, LoanParameters, Mortgage};
use mortgage::report::{Report, DEFAULT_CURRENCY};
use simple_logger::SimpleLogger;

/// Fixed-rate mortgage calculator: monthly payment, total interest and a
/// truncated amortization schedule.
#[derive(Parser, Debug)]
#[command(name = "mortgage", version)]
struct Cli {
    /// Property value in currency units
    #[arg(long, default_value_t = 500000.0, value_parser = non_negative)]
    property_value: f64,
    /// Down payment as a percentage of the property value
    #[arg(long, default_value_t = 20.0, value_parser = percent_up_to::<100>)]
    down_payment: f64,
    /// Annual interest rate in percent
    #[arg(long, default_value_t = 5.0, value_parser = percent_up_to::<30>)]
    rate: f64,
    /// Loan term in years
    #[arg(long, default_value_t = 25, value_parser = clap::value_parser!(u32).range(1..=30))]
    term: u32,
    /// Date of the first monthly payment (YYYY-MM-DD)
    #[arg(long)]
    first_payment: Option<NaiveDate>,
    /// Currency label printed after amounts
    #[arg(long, env = "MORTGAGE_CURRENCY", default_value = DEFAULT_CURRENCY)]
    currency: String,
    #[arg(long, env = "MORTGAGE_LOG", default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,
    /// Print the summary and schedule as JSON
    #[cfg(feature = "serde")]
    #[arg(long)]
    json: bool,
}

fn non_negative(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("`{}` is not a number", s))?;
    if value.is_finite() && value >= 0. {
        Ok(value)
    } else {
        Err(format!("{} must be at least 0", value))
    }
}

fn percent_up_to<const MAX: u32>(s: &str) -> Result<f64, String> {
    let value = non_negative(s)?;
    if value <= MAX as f64 {
        Ok(value)
    } else {
        Err(format!("{} must be at most {}", value, MAX))
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(cli.log_level).init()?;

    let mut params = LoanParameters::new(cli.property_value, cli.down_payment, cli.rate, cli.term);
    if let Some(first) = cli.first_payment {
        params = params.with_first_pmt_date(first);
    }
    info!("calculating {:?}", params);

    let mortgage = calculate_mortgage(&params)?;

    if print_json(cli, &mortgage)? {
        return Ok(());
    }
    println!("{}", Report::new(&mortgage).with_currency(&cli.currency));
    Ok(())
}

#[cfg(feature = "serde")]
fn print_json(cli: &Cli, mortgage: &Mortgage) -> Result<bool, Box<dyn std::error::Error>> {
    if !cli.json {
        return Ok(false);
    }
    let output = serde_json::json!({
        "summary": mortgage.summary,
        "total_paid": mortgage.summary.total_paid(),
        "schedule": mortgage.schedule(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(true)
}

#[cfg(not(feature = "serde"))]
fn print_json(_cli: &Cli, _mortgage: &Mortgage) -> Result<bool, Box<dyn std::error::Error>> {
    Ok(false)
}

// verifies that types can implement the gated traits below
#[cfg(test)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<LoanParameters>();
    is_normal::<Mortgage>();
    is_normal::<mortgage::mortgage::Amortization>();
    is_normal::<mortgage::error::MortgageError>();
}

#[test]
fn cli_defaults_match_form() {
    let cli = Cli::parse_from(["mortgage"]);
    assert_eq!(cli.property_value, 500000.0);
    assert_eq!(cli.down_payment, 20.0);
    assert_eq!(cli.rate, 5.0);
    assert_eq!(cli.term, 25);
    assert!(cli.first_payment.is_none());
}

#[test]
fn cli_rejects_out_of_range() {
    assert!(Cli::try_parse_from(["mortgage", "--down-payment", "150"]).is_err());
    assert!(Cli::try_parse_from(["mortgage", "--term", "0"]).is_err());
    assert!(Cli::try_parse_from(["mortgage", "--rate", "31"]).is_err());
    assert!(Cli::try_parse_from(["mortgage", "--property-value", "-5"]).is_err());
    assert!(Cli::try_parse_from(["mortgage", "--first-payment", "2024-04-01"]).is_ok());
}
