const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const UNDERLINE: &str = "\x1b[4m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

pub fn dim(s: &str) -> String {
    format!("{DIM}{s}{RESET}")
}
pub fn green(s: &str) -> String {
    format!("{GREEN}{s}{RESET}")
}
pub fn red(s: &str) -> String {
    format!("{RED}{s}{RESET}")
}
pub fn yellow(s: &str) -> String {
    format!("{YELLOW}{s}{RESET}")
}
pub fn cyan(s: &str) -> String {
    format!("{CYAN}{s}{RESET}")
}
pub fn bold(s: &str) -> String {
    format!("{BOLD}{s}{RESET}")
}
pub fn underline(s: &str) -> String {
    format!("{UNDERLINE}{s}{RESET}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dot {
    Green,
    Yellow,
    Red,
    Neutral,
}

impl Dot {
    fn paint(self, s: &str) -> String {
        match self {
            Dot::Green => green(s),
            Dot::Yellow => yellow(s),
            Dot::Red => red(s),
            Dot::Neutral => s.to_string(),
        }
    }

    pub fn render(self) -> String {
        match self {
            Dot::Neutral => dim("●"),
            other => other.paint("●"),
        }
    }
}

/// Visible width of `s`, ignoring ANSI escape sequences.
pub fn visible_width(s: &str) -> usize {
    let mut width = 0;
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

const STATUS_NAME_WIDTH: usize = 25;

/// `● Name:<pad> value`, names padded to a common column.
pub fn status_line(dot: Dot, name: &str, value: &str) -> String {
    let fill = STATUS_NAME_WIDTH.saturating_sub(visible_width(name));
    format!(
        "{} {}:{} {}",
        dot.render(),
        name,
        " ".repeat(fill),
        dot.paint(value)
    )
}

pub fn status_help(dot: Dot, help: &str) -> String {
    format!("{} {}", dot.render(), dot.paint(help))
}

pub fn bool_status(value: bool, name: &str, yes: &str, no: &str) -> String {
    if value {
        status_line(Dot::Green, name, yes)
    } else {
        status_line(Dot::Red, name, no)
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", green("✔"), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", cyan("ℹ"), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", yellow("!"), msg);
}

/// Render rows as left-aligned columns separated by two spaces.
pub fn table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| visible_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(visible_width(cell));
            }
        }
    }

    let render_row = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{}{}", cell, " ".repeat(w - visible_width(cell))))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![render_row(header.iter().map(|h| bold(h)).collect())];
    for row in rows {
        out.push(render_row(row.clone()));
    }
    out.join("\n")
}
