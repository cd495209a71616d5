//! MCP Server for library-mcp
//!
//! MCP Protocol (stdio) <-> application::LibraryService / ExportService
//!
//! 8 tools: book_add, member_add, book_issue, book_return, book_search,
//! member_list, save, export_csv

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rmcp::{
    handler::server::{tool::ToolCallContext, tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::application::error::AppError;
use crate::application::export::{ExportConfig, ExportService, DEFAULT_EXPORT_FILENAME};
use crate::application::service::LibraryService;
use crate::domain::model::book::{parse_int_lenient, AddBookRequest, Book};
use crate::domain::model::library::Library;
use crate::domain::model::member::AddMemberRequest;
use crate::infra::json_store::JsonLibraryRepository;

// =============================================================================
// Public entry point
// =============================================================================

/// MCP Serverを起動する。data_dirに books / members / issues の3ファイルを置く。
pub async fn run(data_dir: PathBuf) -> anyhow::Result<()> {
    tracing::info!(data_dir = %data_dir.display(), "starting library MCP server");
    let server = LibraryMcpServer::new(&data_dir);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

// =============================================================================
// MCP Server
// =============================================================================

type Service = LibraryService<JsonLibraryRepository>;

#[derive(Clone)]
struct LibraryMcpServer {
    service: Arc<Mutex<Service>>,
    tool_router: ToolRouter<Self>,
}

impl LibraryMcpServer {
    fn new(data_dir: &Path) -> Self {
        let repo = JsonLibraryRepository::new(data_dir);
        Self {
            service: Arc::new(Mutex::new(LibraryService::open(repo))),
            tool_router: Self::tool_router(),
        }
    }

    /// 1ツール呼び出し = 1ロック。ロックを保持したままawaitしない。
    fn lock(&self) -> Result<MutexGuard<'_, Service>, McpError> {
        self.service
            .lock()
            .map_err(|_| McpError::internal_error("Lock poisoned", None))
    }

    /// ドメインエラーは利用者向けメッセージとして、それ以外は内部エラーとして返す。
    fn to_mcp_error(e: AppError) -> McpError {
        match e {
            AppError::Domain(d) => McpError::invalid_params(d.to_string(), None),
            other => McpError::internal_error(format!("{other}"), None),
        }
    }
}

// =============================================================================
// ServerHandler impl
// =============================================================================

impl ServerHandler for LibraryMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "library-mcp".to_string(),
                title: Some("Library MCP — Books, Members & Issues".to_string()),
                description: Some(
                    "Small library inventory: catalog books, register members, \
                     issue and return copies, export the catalog as CSV."
                        .to_string(),
                ),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Track a library's books, members, and which member holds an issued book.\n\
                 \n\
                 Tools: `book_add`, `member_add` to register; `book_issue` / `book_return` \
                 to lend; `book_search` (empty query lists everything) and `member_list` to view; \
                 `export_csv` to write the catalog. Changes are saved automatically; `save` forces a write."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_ctx = ToolCallContext::new(self, request, context);
        self.tool_router.call(tool_ctx).await
    }
}

// =============================================================================
// Request types
// =============================================================================

/// 整数入力。数値・文字列以外のJSON値（小数、真偽値、配列など）も受け付け、
/// ツール呼び出し全体を失敗させない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
enum IntInput {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl IntInput {
    /// 解釈できない値（範囲外・小数を含む）は0。
    fn to_i32(&self) -> i32 {
        match self {
            IntInput::Number(n) => i32::try_from(*n).unwrap_or(0),
            IntInput::Text(s) => parse_int_lenient(s),
            IntInput::Other(_) => 0,
        }
    }
}

/// filenameにパス区切り文字や".."が含まれていないことを検証する。
fn validate_filename(filename: &str) -> Result<(), McpError> {
    if filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.is_empty()
    {
        return Err(McpError::invalid_params(
            "filename must not contain path separators, '..', or be empty",
            None,
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpBookAddRequest {
    #[schemars(description = "Unique book ID (required)")]
    pub id: String,
    #[schemars(description = "Book title (required)")]
    pub title: String,
    #[schemars(description = "Author (optional)")]
    pub author: Option<String>,
    #[schemars(description = "Publication year. Unparseable values become 0.")]
    pub year: Option<IntInput>,
    #[schemars(description = "Number of copies (default 1). Values below 1 become 1.")]
    pub quantity: Option<IntInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpMemberAddRequest {
    #[schemars(description = "Unique member ID (required)")]
    pub id: String,
    #[schemars(description = "Member name (required)")]
    pub name: String,
    #[schemars(description = "Contact info such as phone or email (optional)")]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpIssueRequest {
    #[schemars(description = "ID of the book to issue")]
    pub book_id: String,
    #[schemars(description = "ID of the member receiving the book")]
    pub member_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpReturnRequest {
    #[schemars(description = "ID of the book being returned")]
    pub book_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpSearchRequest {
    #[schemars(
        description = "Case-insensitive text matched against book ID, title, and author. Omit or leave empty to list all books."
    )]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpMemberListRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpSaveRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpExportRequest {
    #[schemars(description = "Output directory path (default: current directory)")]
    pub output_dir: Option<String>,
    #[schemars(description = "Output filename (default: 'books_export.csv')")]
    pub filename: Option<String>,
}

// =============================================================================
// Tool implementations
// =============================================================================

#[tool_router]
impl LibraryMcpServer {
    #[tool(
        name = "book_add",
        description = "Add a new book to the catalog. ID and title are required; all copies start available.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = false,
            open_world_hint = false
        )
    )]
    async fn book_add(
        &self,
        Parameters(req): Parameters<McpBookAddRequest>,
    ) -> Result<CallToolResult, McpError> {
        let add_req = AddBookRequest {
            id: req.id,
            title: req.title,
            author: req.author.unwrap_or_default(),
            year: req.year.as_ref().map(IntInput::to_i32).unwrap_or(0),
            quantity: req.quantity.as_ref().map(IntInput::to_i32).unwrap_or(0),
        };

        let book = self.lock()?.add_book(add_req).map_err(Self::to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Added book: {}. {} ({} copies)",
            book.id(),
            book.title(),
            book.total_quantity()
        ))]))
    }

    #[tool(
        name = "member_add",
        description = "Register a new member. ID and name are required.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = false,
            open_world_hint = false
        )
    )]
    async fn member_add(
        &self,
        Parameters(req): Parameters<McpMemberAddRequest>,
    ) -> Result<CallToolResult, McpError> {
        let add_req = AddMemberRequest {
            id: req.id,
            name: req.name,
            contact: req.contact.unwrap_or_default(),
        };

        let member = self
            .lock()?
            .add_member(add_req)
            .map_err(Self::to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Added member: {}. {}",
            member.id(),
            member.name()
        ))]))
    }

    #[tool(
        name = "book_issue",
        description = "Issue one copy of a book to a member. Fails if the book is already issued or no copies are available.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = false,
            open_world_hint = false
        )
    )]
    async fn book_issue(
        &self,
        Parameters(req): Parameters<McpIssueRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut svc = self.lock()?;
        let receipt = svc
            .issue_book(&req.book_id, &req.member_id)
            .map_err(Self::to_mcp_error)?;
        let total = svc
            .library()
            .find_book(receipt.book_id.as_str())
            .map(Book::total_quantity)
            .unwrap_or(0);

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Issued {} to {} ({} of {} available)",
            receipt.book_id, receipt.member_id, receipt.available, total
        ))]))
    }

    #[tool(
        name = "book_return",
        description = "Return an issued book. Clears the issue record and makes the copy available again.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = false,
            open_world_hint = false
        )
    )]
    async fn book_return(
        &self,
        Parameters(req): Parameters<McpReturnRequest>,
    ) -> Result<CallToolResult, McpError> {
        let receipt = self
            .lock()?
            .return_book(&req.book_id)
            .map_err(Self::to_mcp_error)?;

        let detail = match receipt.available {
            Some(n) => format!("{n} available"),
            None => "book no longer in catalog".to_string(),
        };
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Returned {} from {} ({})",
            receipt.book_id, receipt.former_holder, detail
        ))]))
    }

    #[tool(
        name = "book_search",
        description = "List books whose ID, title, or author contains the query (case-insensitive). Empty query lists the whole catalog. Shows who holds each issued book.",
        annotations(
            read_only_hint = true,
            destructive_hint = false,
            open_world_hint = false
        )
    )]
    async fn book_search(
        &self,
        Parameters(req): Parameters<McpSearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let svc = self.lock()?;
        let library = svc.library();

        if library.books().is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "Catalog is empty. Use `book_add` to add books.",
            )]));
        }

        let query = req.query.unwrap_or_default();
        let books = svc.search(&query);
        if books.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "No books match '{}'.",
                query.trim()
            ))]));
        }

        Ok(CallToolResult::success(vec![Content::text(
            format_catalog(library, &books),
        )]))
    }

    #[tool(
        name = "member_list",
        description = "List all registered members in registration order, with the books each one currently holds.",
        annotations(
            read_only_hint = true,
            destructive_hint = false,
            open_world_hint = false
        )
    )]
    async fn member_list(
        &self,
        #[allow(unused_variables)] Parameters(_req): Parameters<McpMemberListRequest>,
    ) -> Result<CallToolResult, McpError> {
        let svc = self.lock()?;

        if svc.members().is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No members yet. Use `member_add` to register one.",
            )]));
        }

        Ok(CallToolResult::success(vec![Content::text(
            format_members(svc.library()),
        )]))
    }

    #[tool(
        name = "save",
        description = "Write books, members, and issue records to disk now. Mutating tools already save automatically.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn save(
        &self,
        #[allow(unused_variables)] Parameters(_req): Parameters<McpSaveRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.lock()?.save().map_err(Self::to_mcp_error)?;
        Ok(CallToolResult::success(vec![Content::text("Data saved.")]))
    }

    #[tool(
        name = "export_csv",
        description = "Export the whole catalog as CSV (ID,Title,Author,Year,Total,Available). Library data is NOT modified.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn export_csv(
        &self,
        Parameters(req): Parameters<McpExportRequest>,
    ) -> Result<CallToolResult, McpError> {
        let filename = req
            .filename
            .unwrap_or_else(|| DEFAULT_EXPORT_FILENAME.to_string());
        validate_filename(&filename)?;

        let config = ExportConfig {
            output_dir: req
                .output_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            filename,
        };

        let svc = self.lock()?;
        let library = svc.library();
        let path = ExportService::export(library, &config).map_err(Self::to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Exported {} books to: {}",
            library.books().len(),
            path.display()
        ))]))
    }
}

// =============================================================================
// Helpers — table rendering
// =============================================================================

/// Markdown表のセルとして安全な文字列にする。
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// 蔵書一覧を貸出先つきのMarkdown表にフォーマットする。未貸出は "-"。
fn format_catalog(library: &Library, books: &[&Book]) -> String {
    let mut output = format!(
        "# Books ({} of {})\n\n| ID | Title | Author | Year | Total | Available | Issued To |\n|---|---|---|---|---|---|---|\n",
        books.len(),
        library.books().len()
    );
    for book in books {
        let issued_to = library
            .ledger()
            .issuer_of(book.id())
            .map(|m| cell(m.as_str()))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            cell(book.id().as_str()),
            cell(book.title()),
            cell(book.author()),
            book.year(),
            book.total_quantity(),
            book.available(),
            issued_to
        ));
    }
    output
}

/// 会員一覧。Holdingは台帳上その会員が借りている書籍ID（BookId順）。
fn format_members(library: &Library) -> String {
    let mut output = format!(
        "# Members ({})\n\n| ID | Name | Contact | Holding |\n|---|---|---|---|\n",
        library.members().len()
    );
    for member in library.members() {
        let holding: Vec<String> = library
            .ledger()
            .iter()
            .filter(|(_, holder)| *holder == member.id())
            .map(|(book_id, _)| cell(book_id.as_str()))
            .collect();
        let holding = if holding.is_empty() {
            "-".to_string()
        } else {
            holding.join(", ")
        };
        output.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            cell(member.id().as_str()),
            cell(member.name()),
            cell(member.contact()),
            holding
        ));
    }
    output
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;
    use crate::domain::model::id::BookId;

    fn make_library() -> Library {
        let mut lib = Library::new();
        lib.add_book(AddBookRequest {
            id: "B1".into(),
            title: "Dune".into(),
            author: "Herbert".into(),
            year: 1965,
            quantity: 2,
        })
        .unwrap();
        lib.add_book(AddBookRequest {
            id: "B2".into(),
            title: "Pipes | Filters".into(),
            author: String::new(),
            year: 0,
            quantity: 1,
        })
        .unwrap();
        lib.add_member(AddMemberRequest {
            id: "M1".into(),
            name: "Alice".into(),
            contact: "555-0100".into(),
        })
        .unwrap();
        lib.issue_book("B1", "M1").unwrap();
        lib
    }

    #[test]
    fn server_info() {
        let dir = tempfile::tempdir().unwrap();
        let server = LibraryMcpServer::new(dir.path());
        let info = server.get_info();
        assert_eq!(info.server_info.name, "library-mcp");
        assert!(!info.server_info.version.is_empty());
    }

    #[test]
    fn int_input_accepts_number_or_text() {
        let req: McpBookAddRequest = serde_json::from_str(
            r#"{"id": "B1", "title": "Dune", "year": 1965, "quantity": "3"}"#,
        )
        .unwrap();
        assert_eq!(req.year, Some(IntInput::Number(1965)));
        assert_eq!(req.quantity, Some(IntInput::Text("3".into())));
        assert_eq!(req.quantity.unwrap().to_i32(), 3);
    }

    #[test]
    fn int_input_coerces_garbage_to_zero() {
        assert_eq!(IntInput::Text("soon".into()).to_i32(), 0);
        assert_eq!(IntInput::Number(i64::MAX).to_i32(), 0);
        assert_eq!(IntInput::Number(-2).to_i32(), -2);
    }

    #[test]
    fn int_input_non_integer_json_becomes_zero() {
        let req: McpBookAddRequest = serde_json::from_str(
            r#"{"id": "B1", "title": "Dune", "year": 1965.5, "quantity": 2.0}"#,
        )
        .unwrap();
        assert_eq!(req.year.unwrap().to_i32(), 0);
        assert_eq!(req.quantity.unwrap().to_i32(), 0);

        let req: McpBookAddRequest = serde_json::from_str(
            r#"{"id": "B1", "title": "Dune", "year": true, "quantity": [1]}"#,
        )
        .unwrap();
        assert_eq!(req.year.unwrap().to_i32(), 0);
        assert_eq!(req.quantity.unwrap().to_i32(), 0);
    }

    #[tokio::test]
    async fn book_add_tool_coerces_float_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let server = LibraryMcpServer::new(dir.path());
        let req: McpBookAddRequest = serde_json::from_str(
            r#"{"id": "B1", "title": "Dune", "year": 1965.5, "quantity": 2.0}"#,
        )
        .unwrap();

        server.book_add(Parameters(req)).await.unwrap();

        let svc = server.lock().unwrap();
        let book = svc.library().find_book("B1").unwrap();
        assert_eq!(book.year(), 0);
        assert_eq!(book.total_quantity(), 1);
        assert_eq!(book.available(), 1);
    }

    #[test]
    fn book_add_request_minimal() {
        let req: McpBookAddRequest =
            serde_json::from_str(r#"{"id": "B1", "title": "Dune"}"#).unwrap();
        assert!(req.author.is_none());
        assert!(req.year.is_none());
        assert!(req.quantity.is_none());
    }

    #[test]
    fn empty_requests_parse() {
        let _req: McpMemberListRequest = serde_json::from_str("{}").unwrap();
        let _req: McpSaveRequest = serde_json::from_str("{}").unwrap();
        let req: McpSearchRequest = serde_json::from_str("{}").unwrap();
        assert!(req.query.is_none());
        let req: McpExportRequest = serde_json::from_str("{}").unwrap();
        assert!(req.output_dir.is_none());
        assert!(req.filename.is_none());
    }

    #[test]
    fn validate_filename_rules() {
        assert!(validate_filename("books_export.csv").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("../escape.csv").is_err());
        assert!(validate_filename("dir/file.csv").is_err());
        assert!(validate_filename("dir\\file.csv").is_err());
    }

    #[test]
    fn domain_errors_become_invalid_params() {
        let err = LibraryMcpServer::to_mcp_error(AppError::Domain(DomainError::NotIssued(
            BookId::new("B1"),
        )));
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("not issued"));

        let err = LibraryMcpServer::to_mcp_error(AppError::MalformedCsv { line: 1 });
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn catalog_shows_holder_or_dash() {
        let lib = make_library();
        let books = lib.search("");
        let table = format_catalog(&lib, &books);

        assert!(table.starts_with("# Books (2 of 2)"));
        assert!(table.contains("| B1 | Dune | Herbert | 1965 | 2 | 1 | M1 |"));
        assert!(table.contains("| B2 | Pipes \\| Filters |  | 0 | 1 | 1 | - |"));
    }

    #[test]
    fn catalog_header_counts_filtered_rows() {
        let lib = make_library();
        let books = lib.search("dune");
        assert!(format_catalog(&lib, &books).starts_with("# Books (1 of 2)"));
    }

    #[test]
    fn members_table() {
        let lib = make_library();
        let table = format_members(&lib);
        assert!(table.starts_with("# Members (1)"));
        assert!(table.contains("| M1 | Alice | 555-0100 | B1 |"));
    }

    #[test]
    fn members_table_lists_holdings_or_dash() {
        let mut lib = make_library();
        lib.add_member(AddMemberRequest {
            id: "M2".into(),
            name: "Bob".into(),
            contact: String::new(),
        })
        .unwrap();
        lib.issue_book("B2", "M1").unwrap();

        let table = format_members(&lib);
        assert!(table.contains("| M1 | Alice | 555-0100 | B1, B2 |"));
        assert!(table.contains("| M2 | Bob |  | - |"));
    }

    #[tokio::test]
    async fn tools_mutate_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let server = LibraryMcpServer::new(dir.path());

        server
            .book_add(Parameters(McpBookAddRequest {
                id: "B1".into(),
                title: "Dune".into(),
                author: Some("Herbert".into()),
                year: Some(IntInput::Text("1965".into())),
                quantity: Some(IntInput::Number(2)),
            }))
            .await
            .unwrap();
        server
            .member_add(Parameters(McpMemberAddRequest {
                id: "M1".into(),
                name: "Alice".into(),
                contact: None,
            }))
            .await
            .unwrap();
        server
            .book_issue(Parameters(McpIssueRequest {
                book_id: "B1".into(),
                member_id: "M1".into(),
            }))
            .await
            .unwrap();

        let again = server
            .book_issue(Parameters(McpIssueRequest {
                book_id: "B1".into(),
                member_id: "M1".into(),
            }))
            .await;
        assert!(again.is_err());

        // 別インスタンスで読み直しても状態が残っている
        let reopened = LibraryMcpServer::new(dir.path());
        let svc = reopened.lock().unwrap();
        assert_eq!(svc.library().find_book("B1").unwrap().available(), 1);
        assert_eq!(svc.library().ledger().len(), 1);
    }

    #[tokio::test]
    async fn export_tool_rejects_bad_filename() {
        let dir = tempfile::tempdir().unwrap();
        let server = LibraryMcpServer::new(dir.path());

        let result = server
            .export_csv(Parameters(McpExportRequest {
                output_dir: Some(dir.path().display().to_string()),
                filename: Some("../out.csv".into()),
            }))
            .await;
        assert!(result.is_err());
    }
}
