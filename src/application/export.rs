use std::borrow::Cow;
use std::path::PathBuf;

use crate::domain::model::book::Book;
use crate::domain::model::library::Library;

use super::error::AppError;

pub const CSV_HEADER: &str = "ID,Title,Author,Year,Total,Available";
pub const DEFAULT_EXPORT_FILENAME: &str = "books_export.csv";

/// Export設定
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub filename: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            filename: DEFAULT_EXPORT_FILENAME.to_string(),
        }
    }
}

/// 蔵書一覧 → CSV
pub struct ExportService;

impl ExportService {
    /// 蔵書一覧をCSV文字列に変換する。副作用なし。
    pub fn render_csv(books: &[Book]) -> String {
        let mut buf = String::with_capacity(CSV_HEADER.len() + 1 + books.len() * 48);
        buf.push_str(CSV_HEADER);
        buf.push('\n');
        for book in books {
            buf.push_str(&format!(
                "{},{},{},{},{},{}\n",
                escape_field(book.id().as_str()),
                escape_field(book.title()),
                escape_field(book.author()),
                book.year(),
                book.total_quantity(),
                book.available()
            ));
        }
        buf
    }

    /// 蔵書全体をファイルに書き出す。Libraryは変更しない。
    pub fn export(library: &Library, config: &ExportConfig) -> Result<PathBuf, AppError> {
        let books = library.books();
        let content = Self::render_csv(books);
        let path = config.output_dir.join(&config.filename);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(AppError::ExportIo)?;
        }

        std::fs::write(&path, content).map_err(AppError::ExportIo)?;
        tracing::info!(path = %path.display(), books = books.len(), "books exported");
        Ok(path)
    }

    /// RFC4180形式のCSVをレコード列に分解する。ヘッダ行も1レコードとして返す。
    pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, AppError> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut quote_line = 0;
        let mut line = 1;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if in_quotes {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => in_quotes = false,
                    '\n' => {
                        line += 1;
                        field.push(c);
                    }
                    _ => field.push(c),
                }
                continue;
            }

            match c {
                '"' => {
                    in_quotes = true;
                    quote_line = line;
                }
                ',' => record.push(std::mem::take(&mut field)),
                '\r' if chars.peek() == Some(&'\n') => {}
                '\n' => {
                    line += 1;
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(c),
            }
        }

        if in_quotes {
            return Err(AppError::MalformedCsv { line: quote_line });
        }
        // 末尾改行なしの最終行
        if !field.is_empty() || !record.is_empty() {
            record.push(field);
            records.push(record);
        }
        Ok(records)
    }
}

/// 区切り文字・引用符・改行を含むフィールドだけ引用符で囲み、内部の引用符は二重化する。
fn escape_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}
