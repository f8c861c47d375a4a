pub mod http_auth_client;
