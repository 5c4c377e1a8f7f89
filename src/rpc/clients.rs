// ===========================================================================
// rpc/clients - Typed Service Clients
// ===========================================================================

use super::messages::{
    EndChangeRequest, EndChangeResponse, ExchangeKeyForTokenRequest, ExchangeKeyForTokenResponse,
    GetAffectedBookmarksRequest, GetAffectedBookmarksResponse, ListChangesByStatusRequest,
    ListChangesByStatusResponse, StartChangeRequest, StartChangeResponse,
};
use super::{Result, ServerStream, Transport};
use crate::context::Context;

#[derive(Debug, Clone)]
pub struct ChangesClient {
    transport: Transport,
}

impl ChangesClient {
    pub const SERVICE: &'static str = "changes.ChangesService";

    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn list_changes_by_status(
        &self,
        ctx: &Context,
        request: &ListChangesByStatusRequest,
    ) -> Result<ListChangesByStatusResponse> {
        self.transport.unary(
            ctx,
            &format!("{}/ListChangesByStatus", Self::SERVICE),
            request,
        )
    }

    pub fn start_change(
        &self,
        ctx: &Context,
        request: &StartChangeRequest,
    ) -> Result<ServerStream<StartChangeResponse>> {
        self.transport
            .server_stream(ctx, &format!("{}/StartChange", Self::SERVICE), request)
    }

    pub fn end_change(
        &self,
        ctx: &Context,
        request: &EndChangeRequest,
    ) -> Result<ServerStream<EndChangeResponse>> {
        self.transport
            .server_stream(ctx, &format!("{}/EndChange", Self::SERVICE), request)
    }
}

#[derive(Debug, Clone)]
pub struct BookmarksClient {
    transport: Transport,
}

impl BookmarksClient {
    pub const SERVICE: &'static str = "bookmarks.BookmarksService";

    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn get_affected_bookmarks(
        &self,
        ctx: &Context,
        request: &GetAffectedBookmarksRequest,
    ) -> Result<GetAffectedBookmarksResponse> {
        self.transport.unary(
            ctx,
            &format!("{}/GetAffectedBookmarks", Self::SERVICE),
            request,
        )
    }
}

/// Exchanges API keys for access tokens; used before any token exists
#[derive(Debug, Clone)]
pub struct ApiKeyClient {
    transport: Transport,
}

impl ApiKeyClient {
    pub const SERVICE: &'static str = "apikeys.ApiKeyService";

    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn exchange_key_for_token(
        &self,
        ctx: &Context,
        request: &ExchangeKeyForTokenRequest,
    ) -> Result<ExchangeKeyForTokenResponse> {
        self.transport.unary(
            ctx,
            &format!("{}/ExchangeKeyForToken", Self::SERVICE),
            request,
        )
    }
}
