pub mod arc;
pub mod cmc;
pub mod req_resp;
