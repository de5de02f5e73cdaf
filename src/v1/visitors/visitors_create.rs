#![forbid(unsafe_code)]

use poem::Request;
use poem_openapi::{ OpenApi, payload::Json, Object, ApiResponse };
use anyhow::Result;
use futures::executor::block_on;
use sqlx::Row;
use chrono::{DateTime, Utc};
use log::error;

use crate::utils::errors::HttpResult;
use crate::utils::db_statements::INSERT_VISITOR;
use crate::utils::vsd_utils::{self, timestamp_utc_to_str, RequestDebug};

use crate::RUNTIME_CTX;

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct CreateVisitorApi;

#[derive(Object)]
struct ReqCreateVisitor
{
    user_agent: String,
}

#[derive(Object, Debug)]
pub struct RespCreateVisitor
{
    result_code: String,
    result_msg: String,
    visitor_id: i32,
    greeting: String,
    created: String,
}

// Implement the debug record trait for logging.
impl RequestDebug for ReqCreateVisitor {
    type Req = ReqCreateVisitor;
    fn get_request_info(&self) -> String {
        let mut s = String::with_capacity(255);
        s.push_str("  Request body:");
        s.push_str("\n    user_agent: ");
        s.push_str(&self.user_agent);
        s
    }
}

// ------------------- HTTP Status Codes -------------------
#[derive(Debug, ApiResponse)]
enum VsdResponse {
    #[oai(status = 200)]
    Http200(Json<RespCreateVisitor>),
    #[oai(status = 500)]
    Http500(Json<HttpResult>),
}

fn make_http_200(resp: RespCreateVisitor) -> VsdResponse {
    VsdResponse::Http200(Json(resp))
}
fn make_http_500(msg: String) -> VsdResponse {
    VsdResponse::Http500(Json(HttpResult::new(500.to_string(), msg)))
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl CreateVisitorApi {
    #[oai(path = "/visitors/demo", method = "get")]
    async fn create_visitor_api(&self, http_req: &Request) -> VsdResponse {
        // The caller's user agent is all we record about a visit.
        let user_agent = http_req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        // Package the request parameters.
        let req = ReqCreateVisitor { user_agent };

        // -------------------- Process Request ----------------------
        // Process the request.
        match RespCreateVisitor::process(http_req, &req) {
            Ok(r) => r,
            Err(e) => {
                let msg = "ERROR: ".to_owned() + e.to_string().as_str();
                error!("{}", msg);
                make_http_500(msg)
            }
        }
    }
}

// ***************************************************************************
//                          Request/Response Methods
// ***************************************************************************
impl RespCreateVisitor {
    /// Create a new response.
    fn new(result_code: &str, result_msg: String, visitor_id: i32, created: String) -> Self {
        Self {result_code: result_code.to_string(), result_msg,
              visitor_id, greeting: greeting(visitor_id), created}
    }

    /// Process the request.
    fn process(http_req: &Request, req: &ReqCreateVisitor) -> Result<VsdResponse, anyhow::Error> {
        // Conditional logging depending on log level.
        vsd_utils::debug_request(http_req, req);

        // Record the visit and greet the visitor with the generated id.
        let (visitor_id, created) = block_on(insert_visitor(req))?;
        Ok(make_http_200(Self::new("0", "success".to_string(),
                                   visitor_id, timestamp_utc_to_str(created))))
    }
}

// ---------------------------------------------------------------------------
// greeting:
// ---------------------------------------------------------------------------
fn greeting(visitor_id: i32) -> String {
    format!("Hello, visitor {}!", visitor_id)
}

// ***************************************************************************
//                          Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// insert_visitor:
// ---------------------------------------------------------------------------
async fn insert_visitor(req: &ReqCreateVisitor) -> Result<(i32, DateTime<Utc>)> {
    // Get a connection to the db and start a transaction.  Uncommited transactions
    // are automatically rolled back when they go out of scope.
    // See https://docs.rs/sqlx/latest/sqlx/struct.Transaction.html.
    let mut tx = RUNTIME_CTX.db.begin().await?;

    // Insert the visitor row and read back the generated id and timestamp.
    let row = sqlx::query(INSERT_VISITOR)
        .bind(&req.user_agent)
        .fetch_one(&mut *tx)
        .await?;

    // Commit the transaction.
    tx.commit().await?;

    Ok((row.get(0), row.get(1)))
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::greeting;

    #[test]
    fn greeting_includes_the_generated_id() {
        assert_eq!(greeting(42), "Hello, visitor 42!");
    }
}
