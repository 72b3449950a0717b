use super::PackingRecord;
use regex::Regex;
use std::sync::LazyLock;

/// A field heuristic: look at the section and maybe return a value.
/// Heuristics for one field are tried in order and the first hit wins.
type Heuristic<T> = for<'a, 'b> fn(&'b LineViews<'a>) -> Option<T>;

const PO_HEURISTICS: &[Heuristic<String>] = &[standalone_po_line];
const ITEM_HEURISTICS: &[Heuristic<ItemLines>] =
    &[description_block, data_row, last_seven_digit_number];
const DATE_HEURISTICS: &[Heuristic<String>] = &[date_before_costco_item, date_before_description];
const PROVINCE_HEURISTICS: &[Heuristic<String>] = &[province_after_sold_to];
const SHIP_TO_HEURISTICS: &[Heuristic<String>] = &[line_after_ship_to];

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,2}/[0-9]{1,2}/[0-9]{4})").expect("date pattern is valid")
});

// Word boundaries are ASCII-only so a code glued to an accented letter
// ("Qté1234567") still stands alone.
static BARE_ITEM_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u:\b)[0-9]{7}(?-u:\b)").expect("item code pattern is valid"));

const PROVINCE_CODES: &str = "AB|BC|MB|NB|NL|NS|NT|NU|ON|PE|QC|SK|YT|\
    AL|AK|AZ|AR|CA|CO|CT|DE|FL|GA|HI|IA|ID|IL|IN|KS|KY|LA|MA|MD|ME|MI|MN|MO|MS|MT|\
    NC|ND|NE|NH|NJ|NM|NV|NY|OH|OK|OR|PA|RI|SC|SD|TN|TX|UT|VA|VT|WA|WI|WV|WY";

static PROVINCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?-u:\b)({PROVINCE_CODES})(?-u:\b)")).expect("province pattern is valid")
});

static PROVINCE_AFTER_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r",\s*({PROVINCE_CODES})(?-u:\b)")).expect("province pattern is valid")
});

/// Province lines sit this many lines below the "vendu à" label.
const PROVINCE_OFFSETS: [usize; 2] = [3, 4];

/// The two line views every heuristic works from.
struct LineViews<'a> {
    section: &'a str,
    /// Every line, blanks included, untrimmed.
    raw: Vec<&'a str>,
    /// Trimmed, non-blank lines.
    lines: Vec<&'a str>,
}

impl<'a> LineViews<'a> {
    fn new(section: &'a str) -> Self {
        let raw: Vec<&str> = section.split('\n').collect();
        let lines = raw
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        Self {
            section,
            raw,
            lines,
        }
    }
}

/// Item numbers with their positional quantities.
#[derive(Debug, Default, PartialEq)]
struct ItemLines {
    items: Vec<String>,
    quantities: Vec<String>,
}

impl ItemLines {
    fn push(&mut self, quantity: &str, item: &str) {
        self.quantities.push(quantity.to_string());
        self.items.push(item.to_string());
    }

    fn contains_item(&self, item: &str) -> bool {
        self.items.iter().any(|i| i == item)
    }
}

pub fn extract(section: &str) -> PackingRecord {
    let views = LineViews::new(section);
    let items = first_match(ITEM_HEURISTICS, &views).unwrap_or_default();

    PackingRecord {
        purchase_order: first_match(PO_HEURISTICS, &views),
        item_numbers: items.items,
        quantities: items.quantities,
        order_date: first_match(DATE_HEURISTICS, &views),
        province: first_match(PROVINCE_HEURISTICS, &views),
        ship_to: first_match(SHIP_TO_HEURISTICS, &views),
    }
}

fn first_match<T>(heuristics: &[Heuristic<T>], views: &LineViews<'_>) -> Option<T> {
    heuristics.iter().find_map(|heuristic| heuristic(views))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn contains_ignore_case(line: &str, needle: &str) -> bool {
    line.to_lowercase().contains(needle)
}

// ---------------------------------------------------------------------------
// Purchase order
// ---------------------------------------------------------------------------

fn standalone_po_line(views: &LineViews<'_>) -> Option<String> {
    views
        .lines
        .iter()
        .find(|l| l.len() >= 8 && all_digits(l))
        .map(|l| l.to_string())
}

// ---------------------------------------------------------------------------
// Item numbers and quantities
// ---------------------------------------------------------------------------

/// Lines after the first "description" header. Quantities are single digits
/// and item codes are seven digits, either fused on one line ("11464583") or
/// on two consecutive lines ("1" then "1464583").
fn description_block(views: &LineViews<'_>) -> Option<ItemLines> {
    let header = views
        .raw
        .iter()
        .position(|l| contains_ignore_case(l.trim(), "description"))?;
    let after = &views.raw[header + 1..];
    if after.join("\n").is_empty() {
        return None;
    }
    let block: Vec<&str> = after.iter().map(|l| l.trim()).collect();

    let mut found = ItemLines::default();

    for line in &block {
        if line.len() == 8 && all_digits(line) {
            let (quantity, item) = line.split_at(1);
            found.push(quantity, item);
        }
    }

    for pair in block.windows(2) {
        let (quantity, item) = (pair[0], pair[1]);
        if quantity.len() == 1
            && all_digits(quantity)
            && item.len() == 7
            && all_digits(item)
            && !found.contains_item(item)
        {
            found.push(quantity, item);
        }
    }

    (!found.items.is_empty()).then_some(found)
}

/// Older layout: "<vendor ref> <item> <qty> ..." on a single line.
fn data_row(views: &LineViews<'_>) -> Option<ItemLines> {
    views.lines.iter().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let is_row = parts.len() >= 3
            && parts[0].len() >= 6
            && all_digits(parts[0])
            && parts[1].len() >= 6
            && all_digits(parts[1])
            && all_digits(parts[2]);
        is_row.then(|| {
            let mut row = ItemLines::default();
            row.push(parts[2], parts[1]);
            row
        })
    })
}

/// Last resort: the final seven-digit number in the section, no quantity.
fn last_seven_digit_number(views: &LineViews<'_>) -> Option<ItemLines> {
    let item = BARE_ITEM_CODE.find_iter(views.section).last()?;
    Some(ItemLines {
        items: vec![item.as_str().to_string()],
        quantities: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Order date
// ---------------------------------------------------------------------------

fn find_date(line: &str) -> Option<String> {
    DATE.captures(line).map(|c| c[1].to_string())
}

fn date_before_costco_item(views: &LineViews<'_>) -> Option<String> {
    views
        .lines
        .iter()
        .enumerate()
        .filter(|(_, l)| contains_ignore_case(l, "costco item"))
        .find_map(|(i, _)| find_date(views.lines[i.checked_sub(1)?]))
}

fn date_before_description(views: &LineViews<'_>) -> Option<String> {
    let header = views
        .lines
        .iter()
        .position(|l| contains_ignore_case(l, "description"))?;
    find_date(views.lines[header.checked_sub(1)?])
}

// ---------------------------------------------------------------------------
// Province and ship-to
// ---------------------------------------------------------------------------

/// A code right after a comma ("MONTREAL, QC") beats a bare one.
fn find_province(line: &str) -> Option<String> {
    PROVINCE_AFTER_COMMA
        .captures(line)
        .or_else(|| PROVINCE.captures(line))
        .map(|c| c[1].to_string())
}

fn province_after_sold_to(views: &LineViews<'_>) -> Option<String> {
    views
        .lines
        .iter()
        .enumerate()
        .filter(|(_, l)| contains_ignore_case(l, "vendu à"))
        .find_map(|(i, _)| {
            PROVINCE_OFFSETS
                .iter()
                .find_map(|offset| views.lines.get(i + offset).and_then(|l| find_province(l)))
        })
}

fn line_after_ship_to(views: &LineViews<'_>) -> Option<String> {
    views
        .lines
        .iter()
        .enumerate()
        .filter(|(_, l)| contains_ignore_case(l, "ship to") && l.contains(':'))
        .find_map(|(i, _)| views.lines.get(i + 1).map(|next| next.trim().to_string()))
}
