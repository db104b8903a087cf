use anyhow::Result;
use serde_json::Value;
use shopdesk::dashboard::{DateSpan, Indicator};
use shopdesk::models::{value_text, ApplicationEvent, OrderDetail};
use shopdesk::supplier::{ImportStatus, TaskStatus, KNOWN_SUPPLIERS};
use shopdesk::{DashboardRange, Page};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

const NOT_GIVEN: &str = "not given";
const NO_DATA: &str = "no data";

/// One line per listed order, eg "#12 | New | 5400 ₽"
pub fn order_row(order: &Value) -> String {
    format!(
        "#{} | {} | {} ₽",
        value_text(&order["id"]),
        value_text(&order["status"]["status_name"]),
        value_text(&order["total_price_with_discount"])
    )
}

pub fn application_row(application: &Value) -> String {
    format!(
        "#{} | {} | {}",
        value_text(&application["id"]),
        value_text(&application["status"]),
        value_text(&application["name"])
    )
}

fn or_default<'a>(val: Option<&'a str>, fallback: &'a str) -> &'a str {
    match val.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => fallback,
    }
}

fn pp_page(title: &str, page: &Page, row: fn(&Value) -> String, hint: &str) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    stdout.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(
        &mut stdout,
        "{} (page {} of {})",
        title,
        page.current_page,
        page.total_pages.max(1)
    )?;
    stdout.reset()?;
    if page.is_empty() {
        stdout.set_color(ColorSpec::new().set_dimmed(true))?;
        writeln!(&mut stdout, "nothing here")?;
        stdout.reset()?;
        return Ok(());
    }
    for item in page.data.iter() {
        writeln!(&mut stdout, "{}", row(item))?;
    }
    let mut nav = Vec::new();
    if let Some(prev) = page.previous() {
        nav.push(format!("previous: --page {}", prev));
    }
    if let Some(next) = page.next() {
        nav.push(format!("next: --page {}", next));
    }
    if !nav.is_empty() {
        stdout.set_color(ColorSpec::new().set_dimmed(true).set_italic(true))?;
        writeln!(&mut stdout, "{} ({})", nav.join(", "), hint)?;
        stdout.reset()?;
    }
    Ok(())
}

pub fn pp_order_page(page: &Page) -> Result<()> {
    pp_page("Orders", page, order_row, "details: order <id>")
}

pub fn pp_application_page(page: &Page) -> Result<()> {
    pp_page("Applications", page, application_row, "details: application <id>")
}

fn pp_field(stdout: &mut StandardStream, name: &str, value: &str) -> Result<()> {
    stdout.set_color(ColorSpec::new().set_bold(true))?;
    write!(stdout, "{:>18}: ", name)?;
    stdout.reset()?;
    writeln!(stdout, "{}", value)?;
    Ok(())
}

pub fn pp_order(detail: &OrderDetail, link: &str) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
    writeln!(&mut stdout, "Order #{}", detail.id)?;
    stdout.reset()?;

    pp_field(&mut stdout, "Status", &detail.status.status_name)?;
    pp_field(
        &mut stdout,
        "Total",
        &format!("{} ₽", value_text(&detail.total_price_with_discount)),
    )?;
    pp_field(&mut stdout, "Units", &detail.unit_count().to_string())?;
    pp_field(&mut stdout, "Positions", &detail.items.len().to_string())?;
    pp_field(
        &mut stdout,
        "Delivery address",
        or_default(detail.address.as_deref(), NOT_GIVEN),
    )?;
    pp_field(&mut stdout, "Name", &detail.customer_name())?;
    pp_field(&mut stdout, "Email", or_default(detail.email.as_deref(), NOT_GIVEN))?;
    pp_field(&mut stdout, "Phone", or_default(detail.tel.as_deref(), NOT_GIVEN))?;
    pp_field(&mut stdout, "Storefront", link)?;
    writeln!(&mut stdout)?;

    for (idx, item) in detail.items.iter().enumerate() {
        let product = &item.product;
        stdout.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(&mut stdout, "{}. {}", idx + 1, product.name)?;
        stdout.reset()?;
        writeln!(
            &mut stdout,
            "   item {} | {} ₽ x {}",
            value_text(&product.item_number),
            value_text(&item.price),
            item.quantity
        )?;
        match product.product_supplier_info.as_deref() {
            Some(stock) if !stock.is_empty() => {
                for s in stock {
                    let name = s.supplier_info.as_ref().and_then(|i| i.name.as_deref());
                    writeln!(
                        &mut stdout,
                        "   {}: {} in stock, purchase {} ₽, with markup {} ₽",
                        or_default(name, "unknown supplier"),
                        value_text(&s.quantity),
                        value_text(&s.purchase_price),
                        value_text(&s.extra_charge_price)
                    )?;
                }
            }
            _ => {
                stdout.set_color(ColorSpec::new().set_dimmed(true))?;
                writeln!(&mut stdout, "   no supplier data")?;
                stdout.reset()?;
            }
        }
    }
    Ok(())
}

pub fn pp_application(app: &ApplicationEvent) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
    writeln!(&mut stdout, "Application #{}", app.id)?;
    stdout.reset()?;
    pp_field(&mut stdout, "Status", &app.status)?;
    pp_field(&mut stdout, "Email", or_default(app.email.as_deref(), NOT_GIVEN))?;
    pp_field(&mut stdout, "Phone", or_default(app.tel.as_deref(), NOT_GIVEN))?;
    pp_field(&mut stdout, "Comment", or_default(app.comment.as_deref(), "none"))?;
    pp_field(&mut stdout, "Created", &app.created)?;
    Ok(())
}

pub fn pp_indicators(range: DashboardRange, span: &DateSpan, indicators: &[Indicator]) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    stdout.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(
        &mut stdout,
        "Dashboard, {} ({} to {})",
        range,
        span.date_in()?,
        span.date_out()?
    )?;
    stdout.reset()?;
    if indicators.is_empty() {
        stdout.set_color(ColorSpec::new().set_dimmed(true))?;
        writeln!(&mut stdout, "no indicators returned")?;
        stdout.reset()?;
    }
    for ind in indicators {
        write!(&mut stdout, "- {}: ", ind.name)?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(&mut stdout, "{}", ind.value)?;
        stdout.reset()?;
    }
    Ok(())
}

fn pp_task(stdout: &mut StandardStream, name: &str, task: &TaskStatus) -> Result<()> {
    let status = task.last_status.as_deref().unwrap_or(NO_DATA);
    let color = match status {
        "SUCCESS" => Some(Color::Green),
        "FAILURE" => Some(Color::Red),
        _ => None,
    };
    write!(stdout, "{:>8}: ", name)?;
    stdout.set_color(ColorSpec::new().set_fg(color))?;
    write!(stdout, "{}", status)?;
    stdout.reset()?;
    writeln!(
        stdout,
        " (last run {})",
        task.last_run_time.as_deref().unwrap_or(NO_DATA)
    )?;
    Ok(())
}

pub fn pp_import_status(status: &ImportStatus) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    pp_field(
        &mut stdout,
        "Supplier",
        status.supplier_name.as_deref().unwrap_or(NO_DATA),
    )?;
    pp_field(
        &mut stdout,
        "Extra charge",
        status.extra_charge.as_deref().unwrap_or(NO_DATA),
    )?;
    writeln!(&mut stdout, "Last imports:")?;
    pp_task(&mut stdout, "tyres", &status.tire)?;
    pp_task(&mut stdout, "rims", &status.disk)?;
    Ok(())
}

pub fn pp_suppliers() -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    for (slug, name) in KNOWN_SUPPLIERS {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(&mut stdout, "{:<12}", slug)?;
        stdout.reset()?;
        writeln!(&mut stdout, "{}", name)?;
    }
    Ok(())
}

#[test]
fn test_rows() {
    use serde_json::json;
    assert_eq!(
        order_row(&json!({
            "id": 12,
            "status": {"status_name": "New"},
            "total_price_with_discount": "5400.00"
        })),
        "#12 | New | 5400.00 ₽"
    );
    assert_eq!(
        application_row(&json!({"id": 3, "status": "open", "name": "Oleg"})),
        "#3 | open | Oleg"
    );
    assert_eq!(application_row(&json!({"id": 4})), "#4 |  | ");
}

#[test]
fn test_or_default() {
    assert_eq!(or_default(None, NOT_GIVEN), NOT_GIVEN);
    assert_eq!(or_default(Some("  "), NOT_GIVEN), NOT_GIVEN);
    assert_eq!(or_default(Some("Lenina 1"), NOT_GIVEN), "Lenina 1");
}
