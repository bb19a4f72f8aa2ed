//! Typed contract bindings for the Uniswap surfaces this service reads.
//!
//! All interfaces are read-only subsets: exactly the view functions the
//! adapters call, nothing more.

use alloy::sol;

sol! {
    /// Minimal ERC-20 surface for token metadata.
    #[sol(rpc)]
    interface IErc20 {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }

    /// Uniswap V2 pair (the pair contract is itself the LP token).
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }

    /// Uniswap V3 factory, used to resolve a position's pool address.
    #[sol(rpc)]
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    /// Uniswap V3 pool state reads.
    #[sol(rpc)]
    interface IUniswapV3Pool {
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked);
        function feeGrowthGlobal0X128() external view returns (uint256);
        function feeGrowthGlobal1X128() external view returns (uint256);
        function ticks(int24 tick) external view returns (uint128 liquidityGross, int128 liquidityNet, uint256 feeGrowthOutside0X128, uint256 feeGrowthOutside1X128, int56 tickCumulativeOutside, uint160 secondsPerLiquidityOutsideX128, uint32 secondsOutside, bool initialized);
    }

    /// Uniswap V3 position NFT manager (ERC-721 enumerable).
    #[sol(rpc)]
    interface INonfungiblePositionManager {
        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function positions(uint256 tokenId) external view returns (
            uint96 nonce,
            address operator,
            address token0,
            address token1,
            uint24 fee,
            int24 tickLower,
            int24 tickUpper,
            uint128 liquidity,
            uint256 feeGrowthInside0LastX128,
            uint256 feeGrowthInside1LastX128,
            uint128 tokensOwed0,
            uint128 tokensOwed1
        );
    }

    /// Pool identity for a V4 pool, as hashed into the pool id.
    #[derive(Debug)]
    struct PoolKey {
        address currency0;
        address currency1;
        uint24 fee;
        int24 tickSpacing;
        address hooks;
    }

    /// Uniswap V4 position manager. Not enumerable; token ids must come
    /// from an off-chain index.
    #[sol(rpc)]
    interface IV4PositionManager {
        function positionInfo(uint256 tokenId) external view returns (uint256 info);
        function getPositionLiquidity(uint256 tokenId) external view returns (uint128 liquidity);
        function poolKeys(bytes25 poolId) external view returns (address currency0, address currency1, uint24 fee, int24 tickSpacing, address hooks);
    }

    /// Uniswap V4 StateView lens over the singleton pool manager.
    #[sol(rpc)]
    interface IV4StateView {
        function getSlot0(bytes32 poolId) external view returns (uint160 sqrtPriceX96, int24 tick, uint24 protocolFee, uint24 lpFee);
        function getFeeGrowthInside(bytes32 poolId, int24 tickLower, int24 tickUpper) external view returns (uint256 feeGrowthInside0X128, uint256 feeGrowthInside1X128);
        function getPositionInfo(bytes32 poolId, bytes32 positionId) external view returns (uint128 liquidity, uint256 feeGrowthInside0LastX128, uint256 feeGrowthInside1LastX128);
    }
}
