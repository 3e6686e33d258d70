//! 工作流涉及的合约接口绑定。
//!
//! 托管金库（`IRouterVault`）持有用户资金，仅允许白名单内的路由器
//! 代为执行兑换；份额预估走标准 ERC-4626 预览接口。

use alloy::sol;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[sol(rpc)]
    contract IERC4626 {
        function previewDeposit(uint256 assets) external view returns (uint256 shares);
        function previewRedeem(uint256 shares) external view returns (uint256 assets);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[sol(rpc)]
    contract IRouterVault {
        function isRouterAllowed(address router) external view returns (bool);
        function setRouterAllowed(address router, bool allowed) external;
        function depositViaRouter(
            uint256 assets,
            address router,
            bytes calldata payload,
            uint256 minOut,
            uint256 minShares
        ) external;
        function withdrawViaRouter(
            uint256 shares,
            address router,
            bytes calldata payload,
            uint256 minOut
        ) external;
        function userShares(address owner) external view returns (uint256);
        function currentAssetsOf(address owner) external view returns (uint256);
    }
}
